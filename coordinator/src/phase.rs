//! The linear phase sequence driving one session.

use std::fmt;

use comms::msg::Mode;

use crate::registry::WorkerState;

/// One ordered stage of a session. Linear: no cycles, no revisits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    DataDistribution,
    Training,
    PrepareInference,
    InferenceServing,
    Shutdown,
}

impl Phase {
    /// The phase after `self` under the session's mode plan.
    ///
    /// Inference mode has no dataset or training stage: workers load their
    /// trained artifacts during `PrepareInference` instead.
    pub fn next(self, mode: Mode) -> Option<Phase> {
        let next = match (self, mode) {
            (Phase::Setup, Mode::Train) => Phase::DataDistribution,
            (Phase::Setup, Mode::Inference) => Phase::PrepareInference,
            (Phase::DataDistribution, _) => Phase::Training,
            (Phase::Training, _) => Phase::PrepareInference,
            (Phase::PrepareInference, _) => Phase::InferenceServing,
            (Phase::InferenceServing, _) => Phase::Shutdown,
            (Phase::Shutdown, _) => return None,
        };

        Some(next)
    }

    /// The response kinds that resolve this phase's barrier.
    pub fn expected(self) -> &'static [&'static str] {
        match self {
            Phase::Setup | Phase::DataDistribution => &["ready"],
            Phase::Training => &["training_complete", "training_error"],
            Phase::PrepareInference => &["inference_ready"],
            Phase::InferenceServing | Phase::Shutdown => &[],
        }
    }

    /// The transitional state workers enter when this phase is dispatched
    /// to them.
    pub fn dispatch_state(self) -> Option<WorkerState> {
        match self {
            Phase::Setup => Some(WorkerState::Configuring),
            Phase::Training => Some(WorkerState::Training),
            _ => None,
        }
    }

    /// Whether the phase broadcasts a command and waits on the barrier.
    /// `InferenceServing` is request-driven and `Shutdown` is terminal.
    pub fn is_barrier(self) -> bool {
        matches!(
            self,
            Phase::Setup | Phase::DataDistribution | Phase::Training | Phase::PrepareInference
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::DataDistribution => "data_distribution",
            Phase::Training => "training",
            Phase::PrepareInference => "prepare_inference",
            Phase::InferenceServing => "inference_serving",
            Phase::Shutdown => "shutdown",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(mode: Mode) -> Vec<Phase> {
        let mut phases = vec![Phase::Setup];
        while let Some(next) = phases.last().unwrap().next(mode) {
            phases.push(next);
        }
        phases
    }

    #[test]
    fn train_plan_is_the_full_linear_sequence() {
        assert_eq!(
            plan(Mode::Train),
            vec![
                Phase::Setup,
                Phase::DataDistribution,
                Phase::Training,
                Phase::PrepareInference,
                Phase::InferenceServing,
                Phase::Shutdown,
            ]
        );
    }

    #[test]
    fn inference_plan_skips_dataset_and_training() {
        assert_eq!(
            plan(Mode::Inference),
            vec![
                Phase::Setup,
                Phase::PrepareInference,
                Phase::InferenceServing,
                Phase::Shutdown,
            ]
        );
    }

    #[test]
    fn shutdown_is_terminal() {
        assert_eq!(Phase::Shutdown.next(Mode::Train), None);
        assert_eq!(Phase::Shutdown.next(Mode::Inference), None);
    }

    #[test]
    fn only_barrier_phases_expect_responses() {
        for phase in [
            Phase::Setup,
            Phase::DataDistribution,
            Phase::Training,
            Phase::PrepareInference,
        ] {
            assert!(phase.is_barrier());
            assert!(!phase.expected().is_empty());
        }

        for phase in [Phase::InferenceServing, Phase::Shutdown] {
            assert!(!phase.is_barrier());
            assert!(phase.expected().is_empty());
        }
    }
}
