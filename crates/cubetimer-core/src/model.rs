//! Solve data model
//!
//! Timings, penalties, and solution records shared between the timer
//! lifecycle and the statistics engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Start and end instant of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Timing {
    /// Create a timing. An `end` earlier than `start` is clamped to `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Zero-length timing at `instant`
    pub fn instant(instant: DateTime<Utc>) -> Self {
        Self::new(instant, instant)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }
}

/// Penalty attached to a solve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Penalty {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "+2")]
    PlusTwo,
    #[serde(rename = "DNF")]
    Dnf,
}

impl Penalty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Penalty::None => "",
            Penalty::PlusTwo => "+2",
            Penalty::Dnf => "DNF",
        }
    }
}

impl fmt::Display for Penalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective solve time used by statistics
///
/// `Dnf` orders after every finished time, so sorting, `min` and `max`
/// treat it as the worst possible result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SolveTime {
    /// Finished solve, in milliseconds
    Finished(i64),
    /// Did not finish
    Dnf,
}

impl SolveTime {
    /// Milliseconds of a finished solve, `None` for DNF
    pub fn millis(&self) -> Option<i64> {
        match self {
            SolveTime::Finished(ms) => Some(*ms),
            SolveTime::Dnf => None,
        }
    }

    pub fn is_dnf(&self) -> bool {
        matches!(self, SolveTime::Dnf)
    }
}

impl From<i64> for SolveTime {
    fn from(ms: i64) -> Self {
        SolveTime::Finished(ms)
    }
}

impl fmt::Display for SolveTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::stats::format::format_time(*self))
    }
}

/// A recorded solve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub id: Uuid,
    pub category_id: String,
    pub scramble: String,
    pub timing: Timing,
    pub penalty: Penalty,
}

impl Solution {
    /// Create a solution with a fresh random id
    pub fn new(
        category_id: impl Into<String>,
        scramble: impl Into<String>,
        timing: Timing,
        penalty: Penalty,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category_id: category_id.into(),
            scramble: scramble.into(),
            timing,
            penalty,
        }
    }

    /// Time with the penalty applied
    pub fn real_time(&self) -> SolveTime {
        match self.penalty {
            Penalty::Dnf => SolveTime::Dnf,
            Penalty::PlusTwo => SolveTime::Finished(self.timing.elapsed_ms() + crate::PLUS_TWO_MS),
            Penalty::None => SolveTime::Finished(self.timing.elapsed_ms()),
        }
    }
}
