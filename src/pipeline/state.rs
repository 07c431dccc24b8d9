//! Pipeline state machine.

/// Lifecycle of the pipeline controller.
///
/// `Stopped` is terminal; every other state can reach it. `Recovering`
/// is entered only from `Running`, when a fetch reports the source
/// closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Opening collaborators and priming the first frame
    Initializing,

    /// Actively fetching, estimating, and transmitting
    Running,

    /// User-paused: pacing and stale retransmits only
    Paused,

    /// Source closed mid-stream; reopening and re-priming
    Recovering,

    /// Terminal; cannot be restarted
    Stopped,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(self, target: PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Initializing, Running) => true,

            (Running, Paused) => true,
            (Running, Recovering) => true,

            (Paused, Running) => true,

            (Recovering, Running) => true,

            // Any live state can stop
            (Initializing | Running | Paused | Recovering, Stopped) => true,

            // Self-transitions
            (a, b) if a == b => true,

            _ => false,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, PipelineState::Running)
    }

    pub fn is_paused(self) -> bool {
        matches!(self, PipelineState::Paused)
    }

    pub fn is_stopped(self) -> bool {
        matches!(self, PipelineState::Stopped)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Initializing => "Initializing",
            PipelineState::Running => "Running",
            PipelineState::Paused => "Paused",
            PipelineState::Recovering => "Recovering",
            PipelineState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}
