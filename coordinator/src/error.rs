use std::{error::Error, fmt, io};

use crate::registry::WorkerId;

/// The coordinator's result type.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// All errors that can occur in the coordinator.
///
/// Everything except an interrupt is recovered locally: none of these
/// aborts the session loop on its own.
#[derive(Debug)]
pub enum CoordinatorError {
    /// A worker's dispatch channel was unreachable at send time.
    Transport {
        worker_id: WorkerId,
        source: io::Error,
    },
    /// A well-framed message that violates the protocol contract.
    Protocol {
        worker_id: WorkerId,
        detail: String,
    },
    /// No worker is currently in the inference-ready state.
    NoWorkersAvailable,
    /// A routed request outlived its wait bound.
    RequestTimeout { worker_id: WorkerId },
    /// A domain-level failure reported by a worker inside a well-formed
    /// error response.
    Worker {
        worker_id: WorkerId,
        detail: String,
    },
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { worker_id, source } => {
                write!(f, "transport failure for worker {worker_id}: {source}")
            }
            Self::Protocol { worker_id, detail } => {
                write!(f, "protocol violation from worker {worker_id}: {detail}")
            }
            Self::NoWorkersAvailable => write!(f, "no workers available for inference"),
            Self::RequestTimeout { worker_id } => {
                write!(f, "request to worker {worker_id} timed out")
            }
            Self::Worker { worker_id, detail } => {
                write!(f, "worker {worker_id} error: {detail}")
            }
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CoordinatorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
