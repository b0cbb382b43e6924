use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while normalizing a set of input files
///
/// Argument errors are fatal before any work starts.  Count, DivisionByZero and
/// Sampling errors are local to one input file and are aggregated into the run
/// summary.  Pool errors abort the remaining work of the phase in which they occur.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid arguments: {0}")]
    Argument(String),

    #[error("Could not count reads for {id}: {reason}")]
    Count { id: Arc<str>, reason: String },

    #[error("Read count for {id} is zero; cannot compute sampling fraction")]
    DivisionByZero { id: Arc<str> },

    #[error("Sampling failed for {id}: {reason}")]
    Sampling { id: Arc<str>, reason: String },

    #[error("Worker pool failure: {0}")]
    Pool(String),
}

impl JobError {
    pub fn count(id: &Arc<str>, e: anyhow::Error) -> Self {
        Self::Count {
            id: Arc::clone(id),
            reason: format!("{:#}", e),
        }
    }

    pub fn sampling(id: &Arc<str>, e: anyhow::Error) -> Self {
        Self::Sampling {
            id: Arc::clone(id),
            reason: format!("{:#}", e),
        }
    }

    /// Short label used in the run summary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Argument(_) => "argument error",
            Self::Count { .. } => "count error",
            Self::DivisionByZero { .. } => "division by zero",
            Self::Sampling { .. } => "sampling error",
            Self::Pool(_) => "pool error",
        }
    }
}
