//! The per-phase completion barrier: one response per dispatched worker.

use std::collections::BTreeSet;
use std::time::Duration;

use comms::msg::Response;
use log::{debug, warn};
use tokio::time::Instant;

use crate::channel::Collector;
use crate::registry::{Registry, WorkerId, WorkerState};

/// What one barrier round observed.
#[derive(Debug, Default)]
pub struct BarrierOutcome {
    /// Workers that produced a response this round, in arrival order.
    pub resolved: Vec<WorkerId>,
    /// Subset of `resolved` that reported a `*_error` kind.
    pub failed: Vec<WorkerId>,
    /// Workers marked `Disconnected` after the phase timeout.
    pub timed_out: Vec<WorkerId>,
}

impl BarrierOutcome {
    /// Responses consumed; equals the dispatched worker count whenever no
    /// worker timed out.
    pub fn consumed(&self) -> usize {
        self.resolved.len()
    }

    pub fn fully_resolved(&self) -> bool {
        self.timed_out.is_empty()
    }
}

/// Collects exactly one response per worker in `pending`.
///
/// Each accepted response transitions its worker to the state its kind
/// maps to; error kinds count toward completion exactly like successes.
/// Duplicates, unknown ids and kinds outside `expected` are discarded and
/// logged. When the timeout expires, every unresolved worker is marked
/// `Disconnected` and the barrier completes anyway: progress is never
/// blocked by a silent worker.
pub async fn collect(
    registry: &mut Registry,
    collector: &mut Collector,
    mut pending: BTreeSet<WorkerId>,
    expected: &[&str],
    timeout: Duration,
) -> BarrierOutcome {
    let mut outcome = BarrierOutcome::default();
    let deadline = Instant::now() + timeout;

    while !pending.is_empty() {
        let wait = deadline.saturating_duration_since(Instant::now());
        if wait.is_zero() {
            break;
        }

        let Some(resp) = collector.recv(wait).await else {
            break;
        };

        let id = resp.client_id();
        let kind = resp.kind();

        if !registry.contains(id) {
            warn!("discarding response {kind} from unknown worker {id}");
            continue;
        }
        if !pending.contains(&id) {
            debug!("discarding duplicate response {kind} from worker {id}");
            continue;
        }
        if !expected.contains(&kind) {
            warn!("discarding off-phase response {kind} from worker {id}");
            continue;
        }

        let state = match &resp {
            Response::Ready { .. } | Response::TrainingComplete { .. } => WorkerState::Ready,
            Response::TrainingError { error, .. } => {
                warn!("worker {id} reported training_error: {error}");
                WorkerState::TrainingFailed
            }
            Response::InferenceReady { .. } => WorkerState::InferenceReady,
            // Routed kinds never belong to a phase vocabulary.
            Response::InferenceResult { .. } | Response::InferenceError { .. } => {
                warn!("discarding routed response {kind} from worker {id}");
                continue;
            }
        };

        if resp.is_error() {
            outcome.failed.push(id);
        }

        registry.set_state(id, state);
        pending.remove(&id);
        outcome.resolved.push(id);
        debug!("worker {id} resolved phase with {kind}");
    }

    for id in pending {
        warn!("worker {id} unresolved at phase timeout, marking disconnected");
        registry.set_state(id, WorkerState::Disconnected);
        outcome.timed_out.push(id);
    }

    outcome
}
