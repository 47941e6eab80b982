//! The seam between the command loop and the heavy collaborators: model
//! setup, dataset handling, the training loop and text generation.

use std::{error::Error, fmt, fs, path::PathBuf, thread, time::Duration};

use comms::msg::Mode;
use log::info;
use rand::Rng;

/// A collaborator failure, carried back to the coordinator as the error
/// text of a `*_error` response.
#[derive(Debug)]
pub struct EngineError(pub String);

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// The setup payload as handed to the engine.
#[derive(Debug, Clone)]
pub struct SetupSpec {
    pub model_name: String,
    pub mode: Mode,
    pub client_id: u32,
    pub total_clients: u32,
}

/// The collaborator surface invoked by the worker command loop.
///
/// Implementations run on the blocking pool and may take their time.
pub trait Engine: Send + 'static {
    fn setup(&mut self, spec: &SetupSpec) -> Result<(), EngineError>;
    fn load_data(&mut self) -> Result<(), EngineError>;
    fn train(&mut self, epochs: u32) -> Result<(), EngineError>;
    fn prepare_inference(&mut self) -> Result<(), EngineError>;
    fn infer(&mut self, input: &str) -> Result<String, EngineError>;
}

/// Demo engine standing in for the real model runtime: staged logs, a
/// sample dataset on disk and canned answers, paced to feel like the real
/// thing.
pub struct SimEngine {
    data_dir: PathBuf,
    delay_unit: Duration,
    flaky: bool,
    train_attempts: u32,
    model_name: Option<String>,
}

impl SimEngine {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            delay_unit: Duration::from_millis(100),
            flaky: false,
            train_attempts: 0,
            model_name: None,
        }
    }

    /// Fails the first train attempt with an out-of-memory error and
    /// succeeds on later attempts. Exercises the coordinator's retry
    /// rounds.
    pub fn flaky(mut self) -> Self {
        self.flaky = true;
        self
    }

    /// Pacing for the simulated stages; `Duration::ZERO` disables it.
    pub fn with_delay_unit(mut self, unit: Duration) -> Self {
        self.delay_unit = unit;
        self
    }

    fn pause(&self, units: u32) {
        thread::sleep(self.delay_unit * units);
    }
}

impl Engine for SimEngine {
    fn setup(&mut self, spec: &SetupSpec) -> Result<(), EngineError> {
        info!("loading model {} in {} mode", spec.model_name, spec.mode);
        info!("initializing model parameters");
        self.pause(10);
        info!("loading tokenizer");
        self.pause(5);
        info!("moving model to device");
        self.pause(15);

        self.model_name = Some(spec.model_name.clone());
        info!("model loaded");
        Ok(())
    }

    fn load_data(&mut self) -> Result<(), EngineError> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join("medical_qa.csv");
        let sample = "type,question,answer\n\
            medical,What is diabetes?,Diabetes is a chronic condition...\n\
            medical,What are the symptoms of a heart attack?,Common symptoms include...\n";
        fs::write(&path, sample)?;

        self.pause(5);
        info!("dataset saved to {}", path.display());
        Ok(())
    }

    fn train(&mut self, epochs: u32) -> Result<(), EngineError> {
        self.train_attempts += 1;
        info!("preparing dataset");
        self.pause(10);
        info!("tokenizing examples");
        self.pause(10);

        if self.flaky && self.train_attempts == 1 {
            return Err(EngineError("CUDA out of memory".to_string()));
        }

        info!("training for {epochs} epoch(s)");
        let memory = rand::rng().random_range(2.5..3.2);
        info!("device memory allocated: {memory:.2} GB");
        Ok(())
    }

    fn prepare_inference(&mut self) -> Result<(), EngineError> {
        let model = self.model_name.as_deref().unwrap_or("<unconfigured>");
        info!("loading trained model {model} for inference");
        self.pause(15);
        info!("setting model to evaluation mode");
        self.pause(5);
        Ok(())
    }

    fn infer(&mut self, input: &str) -> Result<String, EngineError> {
        info!("tokenizing input ({} chars)", input.len());
        self.pause(2);
        info!("running model inference");
        self.pause(rand::rng().random_range(5..15));

        Ok(
            "Based on medical knowledge, this involves a complex interaction of factors..."
                .to_string(),
        )
    }
}
