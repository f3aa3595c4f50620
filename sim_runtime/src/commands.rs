use serde::{Deserialize, Serialize};

/// Operator commands accepted by the headless server.
///
/// `Step` drives rounds forward; the navigation commands move every history
/// tracker's marker in lock-step and leave the simulation paused until
/// `Resume` is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandPayload {
    /// Execute `rounds` simulation rounds.
    Step { rounds: u32 },
    /// Move the history marker one recorded round back.
    Back,
    /// Move the history marker one recorded round forward.
    Forward,
    /// Jump the history marker to `round`, clamped to the recorded range.
    Jump { round: u64 },
    /// Resume forward simulation from the marked round, discarding any
    /// recordings later than the marker.
    Resume,
    /// Truncate recordings after the marker without resuming.
    CutOff,
    /// Re-index every recorded round by a constant offset.
    Shift { delta: i64 },
    /// Designate the particle whose stationary part fixes the global frame.
    Anchor { particle: u32 },
    /// Log the current round, marker and metrics.
    Status,
}
