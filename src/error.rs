//! Error types shared across the crate.
//!
//! Input problems (bad files, inconsistent instances, broken decompositions) are reported through
//! these enums. The CLI layer wraps them in `anyhow` with the offending file name.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::{EdgeId, NodeId};

/// Failure to read or interpret an input file
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("missing config key `{0}`")]
    MissingKey(String),
    #[error("config key `{key}` has invalid value `{value}`")]
    InvalidValue { key: String, value: String },
    #[error("invalid TOML")]
    TomlRead(#[from] toml::de::Error),
    #[error("could not serialise to TOML")]
    TomlWrite(#[from] toml::ser::Error),
    #[error(transparent)]
    Instance(#[from] InstanceError),
}

impl ParseError {
    /// Attach a path to an IO failure
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::Malformed { line, message: message.into() }
    }
}

/// An instance that is structurally broken, independent of where it was read from
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstanceError {
    #[error("edge {0} connects a stop to itself")]
    SelfLoop(EdgeId),
    #[error("edge id {0} is used twice")]
    DuplicateEdgeId(EdgeId),
    #[error("no edge with id {0}")]
    UnknownEdge(EdgeId),
    #[error("no edge between stops {from} and {to}")]
    NoEdgeBetween { from: NodeId, to: NodeId },
}

/// A tree decomposition that does not decompose the instance graph
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecompositionError {
    #[error("a tree decomposition needs at least one bag")]
    NoBags,
    #[error("bag {0} is not connected to the root")]
    Unreachable(usize),
    #[error("bag {bag} contains stop {stop}, which is not in the graph")]
    UnknownStop { bag: usize, stop: NodeId },
    #[error("stop {0} is not contained in any bag")]
    MissingStop(NodeId),
    #[error("edge {edge} ({left}, {right}) is not covered by any bag")]
    UncoveredEdge { edge: EdgeId, left: NodeId, right: NodeId },
    #[error("the bags containing stop {0} do not form a subtree")]
    Disconnected(NodeId),
}

/// An internal inconsistency found while replaying build instructions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconstructionError {
    #[error("no partial line matches pattern {0}")]
    NoMatchingPath(String),
    #[error("stop {stop} cannot be inserted into a line matching {pattern}")]
    InsertPositionMissing { stop: NodeId, pattern: String },
    #[error("partial lines matching {left} and {right} do not meet at a shared stop")]
    SpliceMismatch { left: String, right: String },
    #[error(transparent)]
    Instance(#[from] InstanceError),
}

/// Reasons the solver does not return a line concept
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("no feasible line concept exists")]
    Infeasible,
    #[error("bag of size {size} exceeds the configured limit of {limit}")]
    BagTooLarge { size: usize, limit: usize },
    #[error("invalid tree decomposition")]
    InvalidDecomposition(#[from] DecompositionError),
    #[error("could not rebuild the optimal line concept")]
    Reconstruction(#[from] ReconstructionError),
}
