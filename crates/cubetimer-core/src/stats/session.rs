//! Solve history of the current session
//!
//! Keeps the solutions of one category, most recent first, and evaluates
//! the standard statistics panel over them.

use super::measures::{Measure, MeasureKind, MeasureValue};
use crate::model::{Penalty, Solution, SolveTime};
use std::collections::VecDeque;
use uuid::Uuid;

/// Statistics shown for a session, in display order
pub const SUMMARY_MEASURES: [Measure; 12] = [
    Measure::mean(1, usize::MAX),
    Measure::average(3, usize::MAX),
    Measure::new(MeasureKind::Best, 1, usize::MAX),
    Measure::new(MeasureKind::Percentile(0.5), 1, usize::MAX),
    Measure::new(MeasureKind::Worst, 1, usize::MAX),
    Measure::new(MeasureKind::StandardDeviation, 1, usize::MAX),
    Measure::mean(3, 3),
    Measure::best_mean(3),
    Measure::average(5, 5),
    Measure::best_average(5),
    Measure::average(12, 12),
    Measure::best_average(12),
];

/// One row of the statistics panel
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub measure: Measure,
    /// `None` while the session has fewer solves than the measure needs
    pub value: Option<MeasureValue>,
}

impl SummaryRow {
    pub fn description(&self) -> String {
        self.measure.description()
    }

    /// New personal record of a best-of-N measure
    pub fn is_record(&self) -> bool {
        matches!(
            self.measure.kind,
            MeasureKind::BestMean | MeasureKind::BestAverage
        ) && self.value.is_some_and(|v| v.is_record())
    }
}

/// Solve history
#[derive(Debug, Clone, Default)]
pub struct Session {
    category_id: String,
    /// Most recent first
    solutions: VecDeque<Solution>,
}

impl Session {
    pub fn new(category_id: impl Into<String>) -> Self {
        Self {
            category_id: category_id.into(),
            solutions: VecDeque::new(),
        }
    }

    /// Build a session from solutions in any order (sorted by start time)
    pub fn from_solutions(category_id: impl Into<String>, solutions: Vec<Solution>) -> Self {
        let mut solutions = solutions;
        solutions.sort_by_key(|s| std::cmp::Reverse(s.timing.start()));
        Self {
            category_id: category_id.into(),
            solutions: solutions.into(),
        }
    }

    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    /// Solutions, most recent first
    pub fn solutions(&self) -> impl Iterator<Item = &Solution> {
        self.solutions.iter()
    }

    pub fn latest(&self) -> Option<&Solution> {
        self.solutions.front()
    }

    pub fn get(&self, id: Uuid) -> Option<&Solution> {
        self.solutions.iter().find(|s| s.id == id)
    }

    pub fn add(&mut self, solution: Solution) {
        self.solutions.push_front(solution);
    }

    /// Remove a solution
    ///
    /// # Returns
    /// The removed solution, if it was present
    pub fn remove(&mut self, id: Uuid) -> Option<Solution> {
        let index = self.solutions.iter().position(|s| s.id == id)?;
        self.solutions.remove(index)
    }

    /// Change the penalty of a solution
    ///
    /// # Returns
    /// The updated solution, if it was present
    pub fn set_penalty(&mut self, id: Uuid, penalty: Penalty) -> Option<&Solution> {
        let solution = self.solutions.iter_mut().find(|s| s.id == id)?;
        solution.penalty = penalty;
        Some(solution)
    }

    pub fn clear(&mut self) {
        self.solutions.clear();
    }

    /// Penalty-adjusted times, most recent first
    pub fn real_times(&self) -> Vec<SolveTime> {
        self.solutions.iter().map(Solution::real_time).collect()
    }

    pub fn evaluate(&self, measure: &Measure) -> Option<MeasureValue> {
        measure.evaluate(&self.real_times())
    }

    /// Evaluate the standard statistics panel
    pub fn summary(&self) -> Vec<SummaryRow> {
        let times = self.real_times();
        SUMMARY_MEASURES
            .iter()
            .map(|measure| SummaryRow {
                measure: *measure,
                value: measure.evaluate(&times),
            })
            .collect()
    }
}
