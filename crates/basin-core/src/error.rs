//! Error types shared across the basin library.
//!
//! Each subsystem has its own enum; `BasinError` wraps them so the driver can
//! hold a single error type and decide which failures end the run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading or interpreting a key-file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("missing group [{group}]")]
    MissingGroup { group: String },
    #[error("[{group}] missing required key '{key}'")]
    MissingKey { group: String, key: String },
    #[error("[{group}] '{key}': cannot parse '{value}' ({reason})")]
    BadValue {
        group: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Failures while loading a bathymetry grid.
#[derive(Debug, Error)]
pub enum BathymetryError {
    #[error("failed to read bathymetry from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}, column {column}: cannot parse '{value}'")]
    Parse {
        line: usize,
        column: usize,
        value: String,
    },
    #[error("line {line}: expected {expected} values, found {found}")]
    Ragged {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("bathymetry grid is empty")]
    Empty,
}

/// Invalid cell construction or mutation.
#[derive(Debug, Error, PartialEq)]
pub enum CellError {
    #[error("a cell needs at least one grain type")]
    NoGrainTypes,
    #[error("expected {expected} fractions, got {found}")]
    FractionCount { expected: usize, found: usize },
    #[error("negative thickness {0}")]
    NegativeThickness(f64),
    #[error("compaction would grow cell from {current} to {requested}")]
    CompactionIncrease { current: f64, requested: f64 },
    #[error("cell index {index} out of range for column of {len} cells")]
    OutOfRange { index: usize, len: usize },
    #[error("grain type mismatch: {0} vs {1}")]
    GrainTypeMismatch(usize, usize),
}

/// Invalid river setup or a handle that no longer refers to a live river.
#[derive(Debug, Error, PartialEq)]
pub enum RiverError {
    #[error("angle bounds inverted: min {min} > max {max}")]
    InvertedBounds { min: f64, max: f64 },
    #[error("standard deviation must be positive, got {0}")]
    NonPositiveStdDev(f64),
    #[error("hinge ({0}, {1}) lies outside the cube")]
    HingeOutside(usize, usize),
    #[error("stale or unknown river handle {0}")]
    StaleHandle(String),
    #[error("river {0} already has branches; bifurcate one of its leaves")]
    AlreadyBranched(String),
}

/// Umbrella error for the library.
#[derive(Debug, Error)]
pub enum BasinError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bathymetry(#[from] BathymetryError),
    #[error(transparent)]
    Cell(#[from] CellError),
    #[error(transparent)]
    River(#[from] RiverError),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialise snapshot: {0}")]
    Json(#[from] serde_json::Error),
}
