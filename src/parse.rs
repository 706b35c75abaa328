//! Reads and writes instances and line concepts: TOML instance descriptions, and the semicolon
//! separated files of LinTim instance directories.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
    str::FromStr,
};

use tracing::{debug, info, warn};

use crate::{
    config::LinTimConfig,
    error::ParseError,
    graph::{Edge, EdgeId, EdgeInfo, Graph},
    problem::{Instance, Line, LineConcept},
};

/// One non-empty row of a LinTim CSV file, with its line number
struct Row {
    line: usize,
    fields: Vec<String>,
}
impl Row {
    fn get<T: FromStr>(&self, index: usize) -> Result<T, ParseError> {
        let field = self.fields.get(index)
            .ok_or_else(|| ParseError::malformed(self.line, format!("expected at least {} fields", index + 1)))?;
        field.parse()
            .map_err(|_| ParseError::malformed(self.line, format!("cannot interpret `{field}` in column {}", index + 1)))
    }
}

/// Split LinTim CSV text into rows. Whitespace is dropped entirely, `#` comments out the rest of a
/// line, and empty lines are skipped.
fn parse_csv(text: &str) -> Vec<Row> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let content: String = line.split('#').next().unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        (!content.is_empty()).then(|| Row {
            line: i + 1,
            fields: content.split(';').map(str::to_owned).collect(),
        })
    }).collect()
}

fn read_csv(path: &Path) -> Result<Vec<Row>, ParseError> {
    let text = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
    Ok(parse_csv(&text))
}

/// Reads an instance from a file, in TOML format
pub fn parse_instance(path: &Path) -> Result<Instance, ParseError> {
    let text = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
    Ok(Instance::new(toml::from_str(&text)?)?)
}

/// Saves an instance in TOML format to a file
pub fn save_instance(path: &Path, instance: &Instance) -> Result<(), ParseError> {
    let text = toml::to_string(&instance.describe())?;
    fs::write(path, text).map_err(|e| ParseError::io(path, e))
}

/// Read the instance of a LinTim directory: `basis/Edge.giv`, `basis/Load.giv` and the config
pub fn read_lintim_instance(dir: &Path) -> Result<Instance, ParseError> {
    let basis = dir.join("basis");
    let config = LinTimConfig::read_with_fallbacks(dir)?;
    let c_fix = config.get_f64("lpool_costs_fixed")?;
    let c_length = config.get_f64("lpool_costs_length")?;
    let c_edge = config.get_f64("lpool_costs_edges")?;

    let mut edges = vec![];
    for row in read_csv(&basis.join("Edge.giv"))? {
        let length: f64 = row.get(3)?;
        edges.push(Edge {
            id: row.get(0)?,
            left: row.get(1)?,
            right: row.get(2)?,
            info: EdgeInfo { f_min: 0, f_max: 0, cost: length * c_length + c_edge, length },
        });
    }
    let mut bounds = BTreeMap::new();
    for row in read_csv(&basis.join("Load.giv"))? {
        let id: EdgeId = row.get(0)?;
        bounds.insert(id, (row.get::<u32>(2)?, row.get::<u32>(3)?));
    }
    for edge in &mut edges {
        match bounds.remove(&edge.id) {
            Some((f_min, f_max)) => (edge.info.f_min, edge.info.f_max) = (f_min, f_max),
            None => warn!(edge = edge.id, "no load entry, the edge must stay unused"),
        }
    }
    if !bounds.is_empty() {
        debug!(unknown = bounds.len(), "ignored load entries of unknown edges");
    }

    let instance = Instance { graph: Graph::from_edges(edges)?, c_fix };
    info!(dir = %dir.display(), stops = instance.graph.nodes().len(), edges = instance.graph.edges().len(), "read LinTim instance");
    Ok(instance)
}

/// Writes `# line-id; edge-order; edge-id; frequency` rows, numbering lines from 1
pub fn write_line_concept(out: &mut impl Write, line_concept: &LineConcept) -> std::io::Result<()> {
    writeln!(out, "# line-id; edge-order; edge-id; frequency")?;
    for (id, line) in line_concept.lines.iter().enumerate() {
        for (order, edge) in line.edges.iter().enumerate() {
            writeln!(out, "{}; {}; {}; {}", id + 1, order + 1, edge, line.frequency)?;
        }
    }
    Ok(())
}

pub fn save_line_concept(path: &Path, line_concept: &LineConcept) -> Result<(), ParseError> {
    let file = File::create(path).map_err(|e| ParseError::io(path, e))?;
    let mut out = BufWriter::new(file);
    write_line_concept(&mut out, line_concept)
        .and_then(|()| out.flush())
        .map_err(|e| ParseError::io(path, e))
}

/// Read a line concept in the format of [`write_line_concept`]. Lines are ordered by id.
pub fn read_line_concept(path: &Path) -> Result<LineConcept, ParseError> {
    let mut lines: BTreeMap<u32, (BTreeMap<u32, EdgeId>, u32)> = BTreeMap::new();
    for row in read_csv(path)? {
        let (edges, frequency) = lines.entry(row.get(0)?).or_default();
        edges.insert(row.get(1)?, row.get(2)?);
        *frequency = row.get(3)?;
    }
    Ok(LineConcept::new(lines.into_values()
        .map(|(edges, frequency)| Line { frequency, edges: edges.into_values().collect() })
        .collect()))
}

/// Writes `# line-id; length; cost` rows, where the cost of a line counts a single unit of
/// frequency
pub fn write_pool_costs(out: &mut impl Write, instance: &Instance, line_concept: &LineConcept) -> std::io::Result<()> {
    writeln!(out, "# line-id; length; cost")?;
    for (id, line) in line_concept.lines.iter().enumerate() {
        let edges = line.edges.iter().filter_map(|&e| instance.graph.edge(e));
        let (length, cost) = edges.fold((0.0, instance.c_fix), |(l, c), e| (l + e.info.length, c + e.info.cost));
        writeln!(out, "{}; {}; {}", id + 1, length, cost)?;
    }
    Ok(())
}

pub fn save_pool_costs(path: &Path, instance: &Instance, line_concept: &LineConcept) -> Result<(), ParseError> {
    let file = File::create(path).map_err(|e| ParseError::io(path, e))?;
    let mut out = BufWriter::new(file);
    write_pool_costs(&mut out, instance, line_concept)
        .and_then(|()| out.flush())
        .map_err(|e| ParseError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_lintim_dir(dir: &Path) {
        let basis = dir.join("basis");
        fs::create_dir_all(&basis).unwrap();
        fs::write(basis.join("Config.cnf"), "lpool_costs_fixed; 10\nlpool_costs_length; 2\nlpool_costs_edges; 1\n").unwrap();
        fs::write(basis.join("Edge.giv"), concat!(
            "# edge-id; left-stop-id; right-stop-id; length\n",
            "1; 1; 2; 3.5\n",
            "\n",
            "2; 2; 3; 1 # trailing comment\n",
            "3; 2; 1; 7\n",
        )).unwrap();
        fs::write(basis.join("Load.giv"), "# link-index; load; min-freq; max-freq\n1; 4; 1; 3\n2;0;0;2\n99; 1; 1; 1\n").unwrap();
    }

    #[test]
    fn reads_lintim_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_lintim_dir(dir.path());
        let instance = read_lintim_instance(dir.path()).unwrap();
        assert_eq!(instance.c_fix, 10.0);
        assert_eq!(instance.graph.edges().len(), 2, "Ensure the parallel edge is dropped");
        let first = instance.graph.edge(1).unwrap();
        assert_eq!(first.info, EdgeInfo { f_min: 1, f_max: 3, cost: 3.5 * 2.0 + 1.0, length: 3.5 });
        assert_eq!(instance.graph.edge(2).unwrap().info.f_max, 2);
    }

    #[test]
    fn malformed_rows_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_lintim_dir(dir.path());
        fs::write(dir.path().join("basis/Edge.giv"), "1; 1; two; 3\n").unwrap();
        assert!(matches!(read_lintim_instance(dir.path()), Err(ParseError::Malformed { line: 1, .. })));
    }

    #[test]
    fn line_concepts_survive_writing_and_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Line-Concept.lin");
        let line_concept = LineConcept::new(vec![
            Line { frequency: 2, edges: vec![3, 1, 2] },
            Line { frequency: 1, edges: vec![5] },
        ]);
        save_line_concept(&path, &line_concept).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# line-id; edge-order; edge-id; frequency\n1; 1; 3; 2\n"));
        assert_eq!(read_line_concept(&path).unwrap(), line_concept, "Ensure line concepts (de)serialise consistently");
    }

    #[test]
    fn pool_costs_count_one_unit() {
        let dir = tempfile::tempdir().unwrap();
        write_lintim_dir(dir.path());
        let instance = read_lintim_instance(dir.path()).unwrap();
        let line_concept = LineConcept::new(vec![Line { frequency: 2, edges: vec![1, 2] }]);
        let mut out = vec![];
        write_pool_costs(&mut out, &instance, &line_concept).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "# line-id; length; cost\n1; 4.5; 21\n");
    }

    #[test]
    fn toml_instances_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_lintim_dir(dir.path());
        let instance = read_lintim_instance(dir.path()).unwrap();
        let path = dir.path().join("instance.toml");
        save_instance(&path, &instance).unwrap();
        let reread = parse_instance(&path).unwrap();
        assert_eq!(reread.describe(), instance.describe(), "Ensure instance data (de)serialises consistently");
    }
}
