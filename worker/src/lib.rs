pub mod engine;
pub mod error;
pub mod worker;

pub use engine::{Engine, EngineError, SetupSpec, SimEngine};
pub use error::WorkerErr;
pub use worker::Worker;
