//! The session: one run's phase sequence plus the live worker set, owned
//! as an explicit value by the coordinator binary. No process-wide state.

use std::collections::BTreeSet;
use std::time::Duration;

use comms::msg::{Command, Mode};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;

use crate::barrier::{self, BarrierOutcome};
use crate::channel::{Collector, Dispatcher};
use crate::error::Result;
use crate::phase::Phase;
use crate::registry::{Registry, WorkerId};
use crate::retry::RetryPolicy;
use crate::router::InferenceRouter;

/// Knobs for one session run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: Mode,
    pub model_name: String,
    pub epochs: u32,
    /// Barrier bound for every command-and-acknowledge phase.
    pub phase_timeout: Duration,
    /// Wait bound for one routed inference request.
    pub infer_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Train,
            model_name: "facebook/opt-1.3b".to_string(),
            epochs: 2,
            phase_timeout: Duration::from_secs(300),
            infer_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// One coordinator-side run, driving the fleet from setup to shutdown.
pub struct Session<W: AsyncWrite + Unpin> {
    registry: Registry,
    dispatcher: Dispatcher<W>,
    collector: Collector,
    cfg: SessionConfig,
    cancel: CancellationToken,
}

impl<W: AsyncWrite + Unpin> Session<W> {
    pub fn new(
        registry: Registry,
        dispatcher: Dispatcher<W>,
        collector: Collector,
        cfg: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            collector,
            cfg,
            cancel,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Drives the session from `Setup` through `Shutdown`.
    ///
    /// Cancellation observed between phases (or inside the serving loop)
    /// skips forward to the shutdown broadcast; the session always ends
    /// with one.
    pub async fn run(&mut self) -> Result<()> {
        let mut phase = Phase::Setup;

        loop {
            if self.cancel.is_cancelled() {
                info!("cancellation observed, shutting down");
                break;
            }

            info!("entering phase {phase}");
            match phase {
                Phase::Training => {
                    self.run_training().await;
                }
                Phase::InferenceServing => self.serve_inference().await?,
                Phase::Shutdown => break,
                _ => {
                    self.run_phase(phase).await;
                }
            }

            match phase.next(self.cfg.mode) {
                Some(next) => phase = next,
                None => break,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Broadcasts `phase`'s command to every dispatchable worker and waits
    /// on the response barrier.
    pub async fn run_phase(&mut self, phase: Phase) -> BarrierOutcome {
        let targets = self.registry.dispatchable();
        if targets.is_empty() {
            warn!("no dispatchable workers for phase {phase}");
            return BarrierOutcome::default();
        }

        self.dispatch_and_await(phase, targets).await
    }

    /// Runs the training barrier, then bounded retry rounds for the
    /// workers that reported `training_error`. Workers still failed after
    /// the last round stay `TrainingFailed` and drop out of later phases.
    pub async fn run_training(&mut self) -> BarrierOutcome {
        let mut outcome = self.run_phase(Phase::Training).await;
        let mut attempt = 0;

        while !outcome.failed.is_empty() && attempt < self.cfg.retry.max_attempts {
            if self.cancel.is_cancelled() {
                break;
            }

            attempt += 1;
            let delay = self.cfg.retry.backoff(attempt);
            info!(
                "retrying training for workers {:?} (round {attempt} of {}) after {delay:?}",
                outcome.failed, self.cfg.retry.max_attempts
            );
            tokio::time::sleep(delay).await;

            let round = self
                .dispatch_and_await(Phase::Training, outcome.failed.clone())
                .await;

            // `resolved` accumulates responses consumed across rounds;
            // `failed` always reflects the latest round.
            outcome.resolved.extend(round.resolved.iter().copied());
            outcome.timed_out.extend(round.timed_out.iter().copied());
            outcome.failed = round.failed;
        }

        outcome
    }

    async fn dispatch_and_await(&mut self, phase: Phase, targets: Vec<WorkerId>) -> BarrierOutcome {
        let total = self.registry.len() as u32;

        let cfg = &self.cfg;
        let failed_sends = self
            .dispatcher
            .broadcast_with(&targets, |id| make_command(phase, cfg, id, total))
            .await;
        if !failed_sends.is_empty() {
            warn!("dispatch failed for workers {failed_sends:?}, left to the timeout path");
        }

        // A worker whose dispatch failed keeps its prior state until the
        // timeout path resolves it.
        if let Some(state) = phase.dispatch_state() {
            for &id in &targets {
                if !failed_sends.contains(&id) {
                    self.registry.set_state(id, state);
                }
            }
        }

        let pending: BTreeSet<WorkerId> = targets.iter().copied().collect();
        let outcome = barrier::collect(
            &mut self.registry,
            &mut self.collector,
            pending,
            phase.expected(),
            self.cfg.phase_timeout,
        )
        .await;

        info!(
            "phase {phase} barrier: {} consumed, {} failed, {} timed out",
            outcome.consumed(),
            outcome.failed.len(),
            outcome.timed_out.len()
        );
        outcome
    }

    /// Serves the interactive question prompt until `exit`, end of input
    /// or cancellation.
    async fn serve_inference(&mut self) -> Result<()> {
        let router = InferenceRouter::new(self.cfg.infer_timeout);
        let cancel = self.cancel.clone();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("Ask a question (or type 'exit'):");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("stop signal observed, leaving inference serving");
                    break;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    let question = line.trim();
                    if question.is_empty() {
                        continue;
                    }
                    if question.eq_ignore_ascii_case("exit") {
                        break;
                    }

                    match router
                        .route(&self.registry, &mut self.dispatcher, &mut self.collector, question)
                        .await
                    {
                        Ok(reply) => {
                            println!("answer from worker {}: {}", reply.worker_id, reply.output);
                        }
                        Err(e) => warn!("inference request failed: {e}"),
                    }
                }
            }
        }

        Ok(())
    }

    /// Best-effort shutdown broadcast to every known worker. No responses
    /// are expected.
    async fn shutdown(&mut self) {
        let ids = self.registry.ids();
        info!("broadcasting shutdown to {} worker(s)", ids.len());

        let failed = self
            .dispatcher
            .broadcast_with(&ids, |_| Command::Shutdown)
            .await;
        if !failed.is_empty() {
            warn!("shutdown dispatch failed for workers {failed:?}");
        }
    }
}

fn make_command(phase: Phase, cfg: &SessionConfig, worker_id: WorkerId, total_clients: u32) -> Command {
    match phase {
        Phase::Setup => Command::Setup {
            model_name: cfg.model_name.clone(),
            mode: cfg.mode,
            client_id: worker_id,
            total_clients,
        },
        Phase::DataDistribution => Command::LoadData,
        Phase::Training => Command::Train { epochs: cfg.epochs },
        Phase::PrepareInference => Command::PrepareInference,
        Phase::InferenceServing | Phase::Shutdown => Command::Shutdown,
    }
}
