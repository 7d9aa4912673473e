//! Solve lifecycle
//!
//! The [`manager::TimerManager`] coordinates one active [`TimerSource`]
//! (keyboard or Stackmat hardware) and broadcasts [`event::TimerEvent`]s
//! to its listeners.

pub mod clock;
pub mod event;
pub mod keyboard;
pub mod manager;
pub mod stackmat;
pub mod task;

use manager::TimerManager;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by timer sources
#[derive(Error, Debug)]
pub enum TimerError {
    #[error("Timer line is closed")]
    LineClosed,

    #[error("Timer already started")]
    AlreadyStarted,

    #[error("Failed to spawn timer thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Unknown timer trigger: {0}")]
    UnknownTrigger(String),
}

/// Identifier of a timer source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerId {
    #[default]
    #[serde(rename = "KEYBOARD-TIMER-SPACE")]
    KeyboardSpace,
    #[serde(rename = "KEYBOARD-TIMER-CONTROL")]
    KeyboardControl,
    #[serde(rename = "STACKMAT-TIMER")]
    Stackmat,
}

impl TimerId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerId::KeyboardSpace => "KEYBOARD-TIMER-SPACE",
            TimerId::KeyboardControl => "KEYBOARD-TIMER-CONTROL",
            TimerId::Stackmat => "STACKMAT-TIMER",
        }
    }

    pub fn is_keyboard(&self) -> bool {
        !matches!(self, TimerId::Stackmat)
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerId {
    type Err = TimerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KEYBOARD-TIMER-SPACE" => Ok(TimerId::KeyboardSpace),
            "KEYBOARD-TIMER-CONTROL" => Ok(TimerId::KeyboardControl),
            "STACKMAT-TIMER" => Ok(TimerId::Stackmat),
            other => Err(TimerError::UnknownTrigger(other.to_string())),
        }
    }
}

/// A source of solve lifecycle input
///
/// Sources translate their own input (key presses, decoded packets) into
/// coordinator calls. `stop` must be idempotent and must not return before
/// the source's threads have finished.
pub trait TimerSource: Send {
    fn id(&self) -> TimerId;

    /// Begin driving `manager`
    fn start(&mut self, manager: &TimerManager) -> Result<(), TimerError>;

    fn stop(&mut self);

    fn set_inspection_enabled(&mut self, enabled: bool);
}
