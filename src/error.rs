// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by every stage of the flow.
//!
//! Structural problems (bad input files, broken path connectivity, a dead
//! oracle channel) are fatal. Missing arcs and tables are per-variant data
//! gaps: callers drop the offending variant and keep going.

use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum SizerError {
    /// A file could not be opened or read.
    Io { path: String, message: String },
    /// Malformed or missing input data.
    Data { context: String, message: String },
    /// A net has no defined sink, or stage/net records do not line up.
    Connectivity {
        stage: String,
        net: String,
        message: String,
    },
    ArcNotFound {
        cell: String,
        from_pin: String,
        to_pin: String,
    },
    MissingTable {
        cell: String,
        from_pin: String,
        to_pin: String,
    },
    /// The SAT backend reported an internal failure.
    Solver(String),
    /// The timing oracle stream closed or produced unparseable output.
    OracleProtocol(String),
}

pub type Result<T> = std::result::Result<T, SizerError>;

impl SizerError {
    pub fn io(path: &Path, e: impl fmt::Display) -> Self {
        SizerError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }

    pub fn data(context: impl Into<String>, message: impl Into<String>) -> Self {
        SizerError::Data {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Per-variant gaps that the delay-model builder skips over.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SizerError::ArcNotFound { .. } | SizerError::MissingTable { .. }
        )
    }
}

impl fmt::Display for SizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizerError::Io { path, message } => write!(f, "I/O error on {}: {}", path, message),
            SizerError::Data { context, message } => {
                write!(f, "data error in {}: {}", context, message)
            }
            SizerError::Connectivity {
                stage,
                net,
                message,
            } => write!(
                f,
                "connectivity error at stage {} (net {}): {}",
                stage, net, message
            ),
            SizerError::ArcNotFound {
                cell,
                from_pin,
                to_pin,
            } => write!(
                f,
                "no timing arc {}->{} found in {}",
                from_pin, to_pin, cell
            ),
            SizerError::MissingTable {
                cell,
                from_pin,
                to_pin,
            } => write!(
                f,
                "timing arc {}->{} in {} has no rise/fall tables",
                from_pin, to_pin, cell
            ),
            SizerError::Solver(msg) => write!(f, "solver error: {}", msg),
            SizerError::OracleProtocol(msg) => write!(f, "oracle protocol error: {}", msg),
        }
    }
}

impl std::error::Error for SizerError {}

impl From<varisat::solver::SolverError> for SizerError {
    fn from(e: varisat::solver::SolverError) -> Self {
        SizerError::Solver(format!("{:?}", e))
    }
}
