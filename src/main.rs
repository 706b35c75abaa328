#![warn(rust_2018_idioms)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::SolverSettings,
    decomposition::TreeDecomposition,
    generate::GeneratorParams,
    problem::{Instance, LineConcept},
    solver::Solution,
};

mod config;
mod decomposition;
mod error;
mod generate;
mod graph;
mod parse;
mod problem;
mod solver;

#[cfg(test)]
mod test;

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Parser)]
#[command(name = "line-planning")]
#[command(about = "Exact line planning on graphs of bounded treewidth")]
struct Cmd {
    /// Raise the log level (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    action: Action,
}

/// Overrides of the solver settings shared by the solving commands
#[derive(clap::Args)]
struct SettingsArgs {
    /// TOML file with solver settings
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Upper limit for every edge's maximum frequency
    #[arg(long)]
    fmax_clamp: Option<u32>,
    /// Reject decompositions with larger bags
    #[arg(long)]
    max_bag_size: Option<usize>,
}
impl SettingsArgs {
    fn resolve(&self) -> Result<SolverSettings> {
        let mut settings = match &self.settings {
            Some(path) => SolverSettings::load(path).with_context(|| format!("reading {}", path.display()))?,
            None => SolverSettings::default(),
        };
        if self.fmax_clamp.is_some() {
            settings.fmax_clamp = self.fmax_clamp;
        }
        if let Some(size) = self.max_bag_size {
            settings.max_bag_size = size;
        }
        Ok(settings)
    }
}

#[derive(Subcommand)]
enum Action {
    /// Solve a LinTim instance directory and write its line concept
    Solve {
        dir: PathBuf,
        /// Tree decomposition in PACE format [default: <dir>/line-planning/out.td]
        #[arg(long)]
        td: Option<PathBuf>,
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Solve an instance given as TOML
    SolveToml {
        instance: PathBuf,
        td: PathBuf,
        /// Where to write the line concept
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Solve every LinTim instance directory below a root directory
    SolveAll {
        root: PathBuf,
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Evaluate an existing line concept
    Check { dir: PathBuf, line_concept: PathBuf },
    /// Write a random instance, with a tree decomposition next to it
    Generate {
        output: PathBuf,
        #[arg(long)]
        stops: u32,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cmd = Cmd::parse();
    let level = match cmd.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_target(false).with_env_filter(filter).init();

    match cmd.action {
        Action::Solve { dir, td, settings } => {
            let td = td.unwrap_or_else(|| dir.join("line-planning").join("out.td"));
            let (instance, solution) = solve_lintim(&dir, &td, &settings.resolve()?)?;
            report(&instance, &solution.line_concept)
        }
        Action::SolveToml { instance, td, output, settings } => {
            let mut instance = parse::parse_instance(&instance)
                .with_context(|| format!("reading instance {}", instance.display()))?;
            let settings = settings.resolve()?;
            let solution = solve(&mut instance, &td, &settings)?;
            if let Some(output) = output {
                parse::save_line_concept(&output, &solution.line_concept)?;
                info!(path = %output.display(), "wrote line concept");
            }
            report(&instance, &solution.line_concept)
        }
        Action::SolveAll { root, settings } => solve_all(&root, &settings.resolve()?),
        Action::Check { dir, line_concept } => {
            let instance = parse::read_lintim_instance(&dir)?;
            let line_concept = parse::read_line_concept(&line_concept)
                .with_context(|| format!("reading line concept {}", line_concept.display()))?;
            report(&instance, &line_concept)
        }
        Action::Generate { output, stops, seed } => {
            let mut rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
            let (instance, td) = generate::random_instance(&GeneratorParams::new(stops), &mut rng)?;
            parse::save_instance(&output, &instance)?;
            let td_path = output.with_extension("td");
            let mut file = fs::File::create(&td_path).with_context(|| format!("creating {}", td_path.display()))?;
            td.write(&mut file)?;
            info!(instance = %output.display(), td = %td_path.display(), width = td.width(), "generated instance");
            Ok(())
        }
    }
}

/// Apply the settings to `instance` and solve it with the decomposition stored at `td`
fn solve(instance: &mut Instance, td: &Path, settings: &SolverSettings) -> Result<Solution> {
    if let Some(clamp) = settings.fmax_clamp {
        info!(clamp, "clamping maximum frequencies");
        instance.clamp_fmax(clamp);
    }
    let td = TreeDecomposition::read(td)
        .with_context(|| format!("reading tree decomposition {}", td.display()))?;
    let solution = solver::solve(instance, &td, settings)?;
    info!(
        cost = solution.cost,
        width = solution.width,
        operators = solution.operators,
        memo_entries = solution.memo_entries,
        "solved"
    );
    Ok(solution)
}

/// Solve a LinTim directory and write `Line-Concept.lin` and `Pool-Cost.lin` into its
/// `line-planning` folder
fn solve_lintim(dir: &Path, td: &Path, settings: &SolverSettings) -> Result<(Instance, Solution)> {
    let mut instance = parse::read_lintim_instance(dir)
        .with_context(|| format!("reading instance {}", dir.display()))?;
    let solution = solve(&mut instance, td, settings)?;
    let output = dir.join("line-planning");
    fs::create_dir_all(&output).with_context(|| format!("creating {}", output.display()))?;
    parse::save_line_concept(&output.join("Line-Concept.lin"), &solution.line_concept)?;
    parse::save_pool_costs(&output.join("Pool-Cost.lin"), &instance, &solution.line_concept)?;
    info!(dir = %output.display(), lines = solution.line_concept.lines.len(), "wrote line concept");
    Ok((instance, solution))
}

fn solve_all(root: &Path, settings: &SolverSettings) -> Result<()> {
    let dirs = fs::read_dir(root)
        .with_context(|| format!("listing {}", root.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.join("basis").join("Edge.giv").exists())
        .sorted()
        .collect_vec();
    info!(instances = dirs.len(), "solving in parallel");

    let results = dirs.par_iter().map(|dir| {
        let td = dir.join("line-planning").join("out.td");
        (dir, solve_lintim(dir, &td, settings).map(|(_, solution)| solution.cost))
    }).collect::<Vec<_>>();

    let (solved, failed): (Vec<_>, Vec<_>) = results.into_iter().partition(|(_, r)| r.is_ok());
    for (dir, cost) in solved.into_iter()
        .filter_map(|(dir, r)| r.ok().map(|c| (dir, c)))
        .sorted_by_key(|&(_, c)| OrderedFloat(c))
    {
        println!("{}: {cost}", dir.display());
    }
    for (dir, error) in failed.into_iter().filter_map(|(dir, r)| r.err().map(|e| (dir, e))) {
        warn!(dir = %dir.display(), "{error:#}");
        println!("{}: failed", dir.display());
    }
    Ok(())
}

/// Print the lines, the cost breakdown and any bound violations of a line concept
fn report(instance: &Instance, line_concept: &LineConcept) -> Result<()> {
    for (id, line) in line_concept.lines.iter().enumerate() {
        let stops = line.to_vertex_path(&instance.graph)
            .with_context(|| format!("line {} is not a path", id + 1))?;
        println!("line {} (frequency {}): {}", id + 1, line.frequency, stops.iter().join("-"));
    }
    let costs = line_concept.costs(instance);
    println!("lines: {}", line_concept.lines.len());
    println!("cost: {} (fixed {}, edges {})", costs.total, costs.fixed, costs.edges);
    let violations = line_concept.violations(instance);
    println!("feasible: {}", violations.is_empty());
    for v in violations {
        println!("  edge {}: load {} outside [{}, {}]", v.edge, v.load, v.f_min, v.f_max);
    }
    Ok(())
}
