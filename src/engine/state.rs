use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the engine: `Idle -> Running -> {Success, Failure, Paused}`.
/// Any non-running state may start another run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Idle,
    Running,
    Success,
    Failure,
    Paused,
}

/// Outcome of one execute/resume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStatus {
    Success,
    Failure,
    Paused,
}

impl From<ExecStatus> for EngineState {
    fn from(s: ExecStatus) -> Self {
        match s {
            ExecStatus::Success => EngineState::Success,
            ExecStatus::Failure => EngineState::Failure,
            ExecStatus::Paused => EngineState::Paused,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Success => "success",
            EngineState::Failure => "failure",
            EngineState::Paused => "paused",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&EngineState::from(*self), f)
    }
}

/// Passed to the progress callback after each successful checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    /// Checkpoint that just completed.
    pub name: String,
    /// Checkpoints completed so far in this run (1-based).
    pub completed: usize,
    /// Checkpoints this run will attempt (start index to pause point or end).
    pub total: usize,
    /// Progress estimates of completed checkpoints as a share of the
    /// estimates of every checkpoint in range, 0..=100.
    pub percent: u8,
    /// Summed progress estimates (seconds) of completed checkpoints.
    pub estimated_secs_done: u64,
}
