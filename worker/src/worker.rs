//! The worker command loop: receive one command, invoke the matching
//! collaborator, emit exactly one response.

use std::io;

use comms::msg::{Command, Response};
use comms::{MsgReceiver, MsgSender};
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task;

use crate::engine::{Engine, EngineError, SetupSpec};
use crate::error::{Result, WorkerErr};

/// Single-task worker runtime.
///
/// Runs until a `shutdown` command or channel loss; a collaborator failure
/// never kills the loop.
pub struct Worker<E: Engine> {
    engine: Option<E>,
    client_id: u32,
}

impl<E: Engine> Worker<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Some(engine),
            client_id: 0,
        }
    }

    /// Runs the command loop over the given channel ends.
    ///
    /// # Arguments
    /// * `rx` - Command channel from the coordinator.
    /// * `tx` - Shared response channel back to the coordinator.
    ///
    /// # Errors
    /// Returns `WorkerErr` on channel loss or a blocking-pool join
    /// failure. Collaborator failures become `*_error` responses where the
    /// vocabulary has one, and are logged without a response where it does
    /// not (setup, load_data, prepare_inference); the coordinator's
    /// timeout path covers those.
    pub async fn run<R, W>(mut self, mut rx: MsgReceiver<R>, mut tx: MsgSender<W>) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let cmd = match rx.recv::<Command>().await {
                Ok(cmd) => cmd,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    warn!("ignoring unrecognized command: {e}");
                    continue;
                }
                Err(e) => return Err(WorkerErr::Io(e)),
            };

            debug!(command = cmd.kind(); "received command");

            let response = match cmd {
                Command::Shutdown => {
                    info!("shutdown received, leaving command loop");
                    return Ok(());
                }
                Command::Setup {
                    model_name,
                    mode,
                    client_id,
                    total_clients,
                } => {
                    self.client_id = client_id;
                    info!(client_id = client_id, total_clients = total_clients; "configured by coordinator");

                    let spec = SetupSpec {
                        model_name,
                        mode,
                        client_id,
                        total_clients,
                    };
                    match self.with_engine(move |e| e.setup(&spec)).await? {
                        Ok(()) => Some(Response::Ready {
                            client_id: self.client_id,
                        }),
                        Err(e) => {
                            error!("setup failed: {e}");
                            None
                        }
                    }
                }
                Command::LoadData => match self.with_engine(|e| e.load_data()).await? {
                    Ok(()) => Some(Response::Ready {
                        client_id: self.client_id,
                    }),
                    Err(e) => {
                        error!("load_data failed: {e}");
                        None
                    }
                },
                Command::Train { epochs } => match self.with_engine(move |e| e.train(epochs)).await? {
                    Ok(()) => Some(Response::TrainingComplete {
                        client_id: self.client_id,
                    }),
                    Err(e) => Some(Response::TrainingError {
                        client_id: self.client_id,
                        error: e.to_string(),
                    }),
                },
                Command::PrepareInference => {
                    match self.with_engine(|e| e.prepare_inference()).await? {
                        Ok(()) => Some(Response::InferenceReady {
                            client_id: self.client_id,
                        }),
                        Err(e) => {
                            error!("prepare_inference failed: {e}");
                            None
                        }
                    }
                }
                Command::Infer { input } => {
                    match self.with_engine(move |e| e.infer(&input)).await? {
                        Ok(output) => Some(Response::InferenceResult {
                            client_id: self.client_id,
                            output,
                        }),
                        Err(e) => Some(Response::InferenceError {
                            client_id: self.client_id,
                            error: e.to_string(),
                        }),
                    }
                }
            };

            if let Some(resp) = response {
                tx.send(&resp).await.map_err(WorkerErr::Io)?;
            }
        }
    }

    /// Runs one collaborator call on the blocking pool.
    ///
    /// The engine is moved out and back (O(1) moves) to satisfy `'static`
    /// without cloning.
    async fn with_engine<T, F>(&mut self, f: F) -> Result<std::result::Result<T, EngineError>>
    where
        T: Send + 'static,
        F: FnOnce(&mut E) -> std::result::Result<T, EngineError> + Send + 'static,
    {
        let mut engine = self
            .engine
            .take()
            .ok_or_else(|| WorkerErr::EngineJoin("engine not recovered".to_string()))?;

        let (engine, outcome) = task::spawn_blocking(move || {
            let outcome = f(&mut engine);
            (engine, outcome)
        })
        .await
        .map_err(|e| WorkerErr::EngineJoin(e.to_string()))?;

        self.engine = Some(engine);
        Ok(outcome)
    }
}
