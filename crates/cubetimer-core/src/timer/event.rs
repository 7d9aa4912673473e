//! Solve lifecycle events broadcast by the [`TimerManager`](super::manager::TimerManager)

use super::TimerId;
use crate::model::{Penalty, Timing};
use serde::Serialize;

/// Hand pad / key side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

/// Lifecycle event delivered to coordinator listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerEvent {
    /// A new timer source was installed
    TimerChanged(TimerId),
    /// The source reports a zeroed display
    TimerReset,
    HandPressed(Hand),
    HandReleased(Hand),
    InspectionEnabledSet(bool),
    InspectionStarted,
    /// Countdown tick; negative once the 15 seconds are over
    InspectionRunning { remaining_ms: i64 },
    InspectionFinished,
    SolutionStarted,
    SolutionRunning(Timing),
    SolutionFinished { timing: Timing, penalty: Penalty },
}

impl TimerEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            TimerEvent::TimerChanged(_) => "timer_changed",
            TimerEvent::TimerReset => "timer_reset",
            TimerEvent::HandPressed(_) => "hand_pressed",
            TimerEvent::HandReleased(_) => "hand_released",
            TimerEvent::InspectionEnabledSet(_) => "inspection_enabled_set",
            TimerEvent::InspectionStarted => "inspection_started",
            TimerEvent::InspectionRunning { .. } => "inspection_running",
            TimerEvent::InspectionFinished => "inspection_finished",
            TimerEvent::SolutionStarted => "solution_started",
            TimerEvent::SolutionRunning(_) => "solution_running",
            TimerEvent::SolutionFinished { .. } => "solution_finished",
        }
    }

    /// High-frequency events (countdown and running ticks)
    pub fn is_tick(&self) -> bool {
        matches!(
            self,
            TimerEvent::InspectionRunning { .. } | TimerEvent::SolutionRunning(_)
        )
    }
}
