//! The command and response vocabulary exchanged between the coordinator
//! and its workers.
//!
//! Both unions are serde-tagged on the `command` field so the wire form is
//! a flat JSON record, e.g. `{"command": "train", "epochs": 2}`. Unknown
//! tags or missing fields fail deserialization at the channel boundary
//! instead of deep inside a handler.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Operating mode for a session, forwarded to every worker in the setup
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Inference,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Inference => write!(f, "inference"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "inference" => Ok(Mode::Inference),
            other => Err(format!("unknown mode {other:?}, expected train or inference")),
        }
    }
}

/// A control command dispatched from the coordinator to one worker.
///
/// Immutable once sent; a command is never mutated or retracted after
/// dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Setup {
        model_name: String,
        mode: Mode,
        client_id: u32,
        total_clients: u32,
    },
    LoadData,
    Train {
        epochs: u32,
    },
    PrepareInference,
    Infer {
        input: String,
    },
    Shutdown,
}

impl Command {
    /// Wire name of the command kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Setup { .. } => "setup",
            Command::LoadData => "load_data",
            Command::Train { .. } => "train",
            Command::PrepareInference => "prepare_inference",
            Command::Infer { .. } => "infer",
            Command::Shutdown => "shutdown",
        }
    }
}

/// A worker's reply, attributed to the worker by `client_id`.
///
/// Produced once per received command and consumed exactly once by the
/// coordinator's barrier or inference router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Response {
    Ready {
        client_id: u32,
    },
    TrainingComplete {
        client_id: u32,
    },
    TrainingError {
        client_id: u32,
        error: String,
    },
    InferenceReady {
        client_id: u32,
    },
    InferenceResult {
        client_id: u32,
        output: String,
    },
    InferenceError {
        client_id: u32,
        error: String,
    },
}

impl Response {
    /// The worker this response is attributed to.
    pub fn client_id(&self) -> u32 {
        match self {
            Response::Ready { client_id }
            | Response::TrainingComplete { client_id }
            | Response::TrainingError { client_id, .. }
            | Response::InferenceReady { client_id }
            | Response::InferenceResult { client_id, .. }
            | Response::InferenceError { client_id, .. } => *client_id,
        }
    }

    /// Wire name of the response kind, for vocabulary checks and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Ready { .. } => "ready",
            Response::TrainingComplete { .. } => "training_complete",
            Response::TrainingError { .. } => "training_error",
            Response::InferenceReady { .. } => "inference_ready",
            Response::InferenceResult { .. } => "inference_result",
            Response::InferenceError { .. } => "inference_error",
        }
    }

    /// Whether this kind reports a domain-level failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Response::TrainingError { .. } | Response::InferenceError { .. }
        )
    }
}
