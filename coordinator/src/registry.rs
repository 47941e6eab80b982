//! Tracks known workers, their addresses and lifecycle state.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;

/// Stable per-session worker identifier; matches the `client_id` field on
/// the wire.
pub type WorkerId = u32;

/// Lifecycle state of one worker, as observed by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Registered,
    Configuring,
    Ready,
    Training,
    TrainingFailed,
    InferenceReady,
    Disconnected,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Registered => "registered",
            WorkerState::Configuring => "configuring",
            WorkerState::Ready => "ready",
            WorkerState::Training => "training",
            WorkerState::TrainingFailed => "training_failed",
            WorkerState::InferenceReady => "inference_ready",
            WorkerState::Disconnected => "disconnected",
        };
        write!(f, "{name}")
    }
}

/// One registered worker.
#[derive(Debug)]
pub struct WorkerEntry {
    pub id: WorkerId,
    pub addr: String,
    pub state: WorkerState,
}

/// The live worker set for one session.
///
/// Owns every entry; response-driven transitions are applied by the
/// barrier, transitional dispatch marks by the phase machine.
#[derive(Debug, Default)]
pub struct Registry {
    workers: BTreeMap<WorkerId, WorkerEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a worker in the `Registered` state.
    pub fn register(&mut self, id: WorkerId, addr: impl Into<String>) {
        self.workers.insert(
            id,
            WorkerEntry {
                id,
                addr: addr.into(),
                state: WorkerState::Registered,
            },
        );
    }

    pub fn contains(&self, id: WorkerId) -> bool {
        self.workers.contains_key(&id)
    }

    pub fn state(&self, id: WorkerId) -> Option<WorkerState> {
        self.workers.get(&id).map(|w| w.state)
    }

    pub fn set_state(&mut self, id: WorkerId, state: WorkerState) {
        if let Some(worker) = self.workers.get_mut(&id) {
            debug!("worker {id}: {} -> {state}", worker.state);
            worker.state = state;
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Every known worker id, in id order.
    pub fn ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    /// Workers eligible for a phase broadcast.
    pub fn dispatchable(&self) -> Vec<WorkerId> {
        self.in_states(&[WorkerState::Registered, WorkerState::Ready])
    }

    /// Workers eligible for inference routing.
    pub fn inference_ready(&self) -> Vec<WorkerId> {
        self.in_states(&[WorkerState::InferenceReady])
    }

    pub fn in_states(&self, states: &[WorkerState]) -> Vec<WorkerId> {
        self.workers
            .values()
            .filter(|w| states.contains(&w.state))
            .map(|w| w.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_workers_are_registered_and_dispatchable() {
        let mut registry = Registry::new();
        registry.register(1, "10.0.0.1:5555");
        registry.register(2, "10.0.0.2:5555");

        assert_eq!(registry.state(1), Some(WorkerState::Registered));
        assert_eq!(registry.dispatchable(), vec![1, 2]);
        assert!(registry.inference_ready().is_empty());
    }

    #[test]
    fn failed_and_disconnected_workers_are_not_dispatchable() {
        let mut registry = Registry::new();
        registry.register(1, "a:1");
        registry.register(2, "b:1");
        registry.register(3, "c:1");

        registry.set_state(1, WorkerState::TrainingFailed);
        registry.set_state(2, WorkerState::Ready);
        registry.set_state(3, WorkerState::Disconnected);

        assert_eq!(registry.dispatchable(), vec![2]);
    }

    #[test]
    fn set_state_on_unknown_worker_is_a_no_op() {
        let mut registry = Registry::new();
        registry.register(1, "a:1");
        registry.set_state(9, WorkerState::Ready);

        assert_eq!(registry.state(9), None);
        assert_eq!(registry.state(1), Some(WorkerState::Registered));
    }
}
