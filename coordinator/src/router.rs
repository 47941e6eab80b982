//! Routes one inference question to one ready worker and correlates the
//! reply.

use std::time::Duration;

use comms::msg::{Command, Response};
use log::{debug, warn};
use rand::seq::IndexedRandom;
use tokio::io::AsyncWrite;
use tokio::time::Instant;

use crate::channel::{Collector, Dispatcher};
use crate::error::{CoordinatorError, Result};
use crate::registry::{Registry, WorkerId};

/// A correlated answer from one worker.
#[derive(Debug, PartialEq)]
pub struct InferenceReply {
    pub worker_id: WorkerId,
    pub output: String,
}

/// Off-phase request router for the inference-serving stage.
///
/// Handles one outstanding request at a time: the serving loop is
/// request-response, not pipelined.
#[derive(Debug, Clone)]
pub struct InferenceRouter {
    timeout: Duration,
}

impl InferenceRouter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Selects one `InferenceReady` worker uniformly at random, dispatches
    /// `infer` with the question text and waits for the response
    /// correlated by `client_id`. Uncorrelated responses seen while
    /// waiting are discarded.
    ///
    /// A worker answering `inference_error` stays in rotation: one failed
    /// request never evicts it.
    ///
    /// # Errors
    /// `NoWorkersAvailable` when no worker is ready, `Worker` for an
    /// `inference_error` reply, `RequestTimeout` when the wait bound
    /// expires, `Transport` when the dispatch itself fails.
    pub async fn route<W>(
        &self,
        registry: &Registry,
        dispatcher: &mut Dispatcher<W>,
        collector: &mut Collector,
        question: &str,
    ) -> Result<InferenceReply>
    where
        W: AsyncWrite + Unpin,
    {
        let ready = registry.inference_ready();
        let Some(&worker_id) = ready.choose(&mut rand::rng()) else {
            return Err(CoordinatorError::NoWorkersAvailable);
        };

        debug!("routing question to worker {worker_id}");
        let cmd = Command::Infer {
            input: question.to_string(),
        };
        dispatcher.send(worker_id, &cmd).await?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                return Err(CoordinatorError::RequestTimeout { worker_id });
            }

            let Some(resp) = collector.recv(wait).await else {
                return Err(CoordinatorError::RequestTimeout { worker_id });
            };

            if resp.client_id() != worker_id {
                warn!(
                    "discarding uncorrelated response {} from worker {}",
                    resp.kind(),
                    resp.client_id()
                );
                continue;
            }

            return match resp {
                Response::InferenceResult { output, .. } => Ok(InferenceReply { worker_id, output }),
                Response::InferenceError { error, .. } => Err(CoordinatorError::Worker {
                    worker_id,
                    detail: error,
                }),
                other => Err(CoordinatorError::Protocol {
                    worker_id,
                    detail: format!("expected an inference reply, got {}", other.kind()),
                }),
            };
        }
    }
}
