//! Cubetimer - speedcubing timer with Stackmat support
//!
//! This library re-exports the Stackmat decoder, the timer lifecycle and
//! the statistics engine from `cubetimer-core`, and adds the persistent
//! application configuration used by the command-line front end.

pub mod config;

pub use cubetimer_core::audio;
pub use cubetimer_core::model;
pub use cubetimer_core::stats;
pub use cubetimer_core::timer;

pub use cubetimer_core::{AudioEngine, Packet, StackmatDecoder};
pub use cubetimer_core::{Hand, TimerError, TimerEvent, TimerId, TimerManager, TimerSource};
pub use cubetimer_core::{Measure, MeasureKind, MeasureValue, Session};
pub use cubetimer_core::{Penalty, Solution, SolveTime, Timing};
pub use cubetimer_core::{DEFAULT_SAMPLE_RATE, VERSION};
