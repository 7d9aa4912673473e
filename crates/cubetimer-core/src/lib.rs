//! Cubetimer Core - Stackmat decoding, timer lifecycle, and solve statistics
//!
//! This library provides the core functionality of a speedcubing timer:
//! it demodulates the audio signal of a Stackmat competition timer, drives
//! the solve lifecycle (inspection, running, penalties) from either the
//! hardware timer or the keyboard, and computes competition-style
//! statistics over the solve history.

pub mod audio;
pub mod model;
pub mod stats;
pub mod timer;

pub use audio::{decoder::StackmatDecoder, engine::AudioEngine, packet::Packet};
pub use model::{Penalty, Solution, SolveTime, Timing};
pub use stats::measures::{Measure, MeasureKind, MeasureValue};
pub use stats::session::Session;
pub use timer::event::{Hand, TimerEvent};
pub use timer::manager::TimerManager;
pub use timer::{TimerError, TimerId, TimerSource};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (YYYY-MM-DD), stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default sample rate of the Stackmat line-in (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Stackmat serial baud rate (bits per second)
pub const STACKMAT_BAUD_RATE: u32 = 1200;

/// Nominal inspection time (ms)
pub const INSPECTION_TIME_MS: i64 = 15000;

/// Inspection overtime after which the solve is a DNF (ms)
pub const INSPECTION_LIMIT_MS: i64 = 17000;

/// Time added by a "+2" penalty (ms)
pub const PLUS_TWO_MS: i64 = 2000;
