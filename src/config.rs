//! Configuration: the LinTim `Config.cnf` key/value files an instance directory carries, and the
//! settings of the solver itself.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ParseError;

/// Key/value pairs read from LinTim config files. Later keys override earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinTimConfig {
    values: HashMap<String, String>,
}
impl LinTimConfig {
    /// Read `path`, following `include` and `include_if_exists` directives
    pub fn read(path: &Path) -> Result<Self, ParseError> {
        let mut config = Self::default();
        config.read_into(path)?;
        Ok(config)
    }

    /// Read `basis/Config.cnf` of an instance directory, or `basis/Private-Config.cnf` if the former
    /// is missing
    pub fn read_with_fallbacks(instance_dir: &Path) -> Result<Self, ParseError> {
        let basis = instance_dir.join("basis");
        let primary = basis.join("Config.cnf");
        if primary.exists() {
            return Self::read(&primary);
        }
        Self::read(&basis.join("Private-Config.cnf"))
    }

    fn read_into(&mut self, path: &Path) -> Result<(), ParseError> {
        let text = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for (number, line) in text.lines().enumerate().map(|(i, l)| (i + 1, l)) {
            let content = line.split('#').next().unwrap_or_default().trim();
            if content.is_empty() {
                continue;
            }
            let Some((key, value)) = content.split_once(';') else {
                return Err(ParseError::malformed(number, format!("expected `key; value` in {}", path.display())));
            };
            let key = key.trim();
            let joined = value.split(';').map(str::trim).collect::<Vec<_>>().join(";");
            let value = unquote(joined.trim());
            match key {
                "include" => self.read_into(&parent.join(value))?,
                "include_if_exists" => {
                    let included: PathBuf = parent.join(value);
                    if included.exists() {
                        self.read_into(&included)?;
                    } else {
                        debug!(path = %included.display(), "optional config include not found");
                    }
                }
                _ => {
                    self.values.insert(key.to_owned(), value.to_owned());
                }
            }
        }
        Ok(())
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ParseError> {
        self.values.get(key).map(String::as_str).ok_or_else(|| ParseError::MissingKey(key.to_owned()))
    }

    fn get_parsed<T: FromStr>(&self, key: &str) -> Result<T, ParseError> {
        let value = self.get_str(key)?;
        value.parse().map_err(|_| ParseError::InvalidValue { key: key.to_owned(), value: value.to_owned() })
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, ParseError> {
        self.get_parsed(key)
    }

}

fn unquote(value: &str) -> &str {
    value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value)
}

/// Settings of a solver run, read from a TOML file
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SolverSettings {
    /// Decompositions with a larger bag are rejected before solving
    pub max_bag_size: usize,
    /// Upper limit applied to every edge's `f_max`
    pub fmax_clamp: Option<u32>,
    pub validate_decomposition: bool,
}
impl Default for SolverSettings {
    fn default() -> Self {
        Self { max_bag_size: 6, fmax_clamp: None, validate_decomposition: true }
    }
}
impl SolverSettings {
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let text = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
        let settings: Self = toml::from_str(&text)?;
        if settings.max_bag_size > 8 {
            warn!(max_bag_size = settings.max_bag_size, "large bags make the dynamic program very slow");
        }
        Ok(settings)
    }
}
