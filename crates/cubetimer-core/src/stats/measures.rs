//! Statistical measures over solve histories
//!
//! Every measure is a pure function of a slice of [`SolveTime`]s ordered
//! most-recent-first. DNF sorts after every finished time, so it is the
//! natural worst value for `min`/`max`/sorting; aggregates that need every
//! value to be finite (means, averages, deviations) report DNF instead.

use crate::model::SolveTime;

/// Kind of statistic
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasureKind {
    Mean,
    /// Mean without the single best and worst time
    Average,
    Best,
    Worst,
    /// Value at fractional rank `p` (0.0..=1.0) of the sorted window
    Percentile(f64),
    StandardDeviation,
    InterquartileMean,
    /// Best mean over every window of the minimum size
    BestMean,
    /// Best average over every window of the minimum size
    BestAverage,
}

/// A configured statistic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measure {
    pub kind: MeasureKind,
    /// Fewest solves for which the measure is defined
    pub minimum_window_size: usize,
    /// Most recent solves the measure looks at
    pub maximum_window_size: usize,
}

/// Result of evaluating a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureValue {
    pub value: SolveTime,
    /// Index (from the most recent solve) of the extremal value or window
    pub window_position: usize,
}

impl MeasureValue {
    fn at_latest(value: SolveTime) -> Self {
        Self {
            value,
            window_position: 0,
        }
    }

    /// The most recent solve or window is the best ever seen
    pub fn is_record(&self) -> bool {
        self.window_position == 0 && !self.value.is_dnf()
    }
}

impl Measure {
    pub const fn new(kind: MeasureKind, minimum_window_size: usize, maximum_window_size: usize) -> Self {
        Self {
            kind,
            minimum_window_size,
            maximum_window_size,
        }
    }

    pub const fn mean(minimum: usize, maximum: usize) -> Self {
        Self::new(MeasureKind::Mean, minimum, maximum)
    }

    pub const fn average(minimum: usize, maximum: usize) -> Self {
        Self::new(MeasureKind::Average, minimum, maximum)
    }

    pub const fn best_mean(size: usize) -> Self {
        Self::new(MeasureKind::BestMean, size, usize::MAX)
    }

    pub const fn best_average(size: usize) -> Self {
        Self::new(MeasureKind::BestAverage, size, usize::MAX)
    }

    /// Human readable label, e.g. "Average (last 5)"
    pub fn description(&self) -> String {
        let base = match self.kind {
            MeasureKind::Mean => "Mean".to_string(),
            MeasureKind::Average => "Average".to_string(),
            MeasureKind::Best => "Best".to_string(),
            MeasureKind::Worst => "Worst".to_string(),
            MeasureKind::Percentile(p) if p == 0.5 => "Median".to_string(),
            MeasureKind::Percentile(p) => format!("Percentile {}", (p * 100.0).round()),
            MeasureKind::StandardDeviation => "Std. dev.".to_string(),
            MeasureKind::InterquartileMean => "Interquartile mean".to_string(),
            MeasureKind::BestMean => return format!("Best mean of {}", self.minimum_window_size),
            MeasureKind::BestAverage => {
                return format!("Best average of {}", self.minimum_window_size)
            }
        };

        if self.maximum_window_size < usize::MAX {
            format!("{} (last {})", base, self.maximum_window_size)
        } else {
            base
        }
    }

    /// Evaluate over a most-recent-first history
    ///
    /// # Returns
    /// `None` while the history is shorter than the minimum window size
    pub fn evaluate(&self, times: &[SolveTime]) -> Option<MeasureValue> {
        let minimum = self.minimum_window_size.max(1);
        if times.len() < minimum {
            return None;
        }
        let window = &times[..times.len().min(self.maximum_window_size)];

        let value = match self.kind {
            MeasureKind::Mean => MeasureValue::at_latest(mean(window)),
            MeasureKind::Average => MeasureValue::at_latest(average(window)),
            MeasureKind::Best => best(window),
            MeasureKind::Worst => worst(window),
            MeasureKind::Percentile(p) => MeasureValue::at_latest(percentile(window, p)),
            MeasureKind::StandardDeviation => {
                MeasureValue::at_latest(standard_deviation(window))
            }
            MeasureKind::InterquartileMean => MeasureValue::at_latest(interquartile_mean(window)),
            MeasureKind::BestMean => best_window(times, minimum, mean)?,
            MeasureKind::BestAverage => best_window(times, minimum, average)?,
        };
        Some(value)
    }
}

fn finished(times: &[SolveTime]) -> Option<Vec<i64>> {
    times.iter().map(SolveTime::millis).collect()
}

/// Arithmetic mean (truncated to whole milliseconds)
pub fn mean(times: &[SolveTime]) -> SolveTime {
    match finished(times) {
        Some(values) if !values.is_empty() => {
            SolveTime::Finished(values.iter().sum::<i64>() / values.len() as i64)
        }
        _ => SolveTime::Dnf,
    }
}

/// Trimmed mean: drops one best and one worst time
///
/// Defined for three or more times; shorter windows report DNF.
pub fn average(times: &[SolveTime]) -> SolveTime {
    if times.len() < 3 {
        return SolveTime::Dnf;
    }
    let Some(values) = finished(times) else {
        return SolveTime::Dnf;
    };

    let sum: i64 = values.iter().sum();
    let best = values.iter().copied().min().unwrap_or(0);
    let worst = values.iter().copied().max().unwrap_or(0);
    SolveTime::Finished((sum - best - worst) / (values.len() as i64 - 2))
}

/// Fastest time and its position; ties go to the older solve
pub fn best(times: &[SolveTime]) -> MeasureValue {
    extremum(times, |candidate, current| candidate <= current)
}

/// Slowest time and its position; ties go to the older solve
pub fn worst(times: &[SolveTime]) -> MeasureValue {
    extremum(times, |candidate, current| candidate >= current)
}

fn extremum(times: &[SolveTime], replaces: impl Fn(SolveTime, SolveTime) -> bool) -> MeasureValue {
    let mut result = MeasureValue {
        value: SolveTime::Dnf,
        window_position: 0,
    };
    for (position, &time) in times.iter().enumerate() {
        if position == 0 || replaces(time, result.value) {
            result = MeasureValue {
                value: time,
                window_position: position,
            };
        }
    }
    result
}

/// Percentile by linear interpolation between order statistics
///
/// The rank is `p * (n - 1)` in the ascending sorted window. An exact rank
/// returns that order statistic; otherwise both neighbours must be finished
/// times or the result is DNF.
pub fn percentile(times: &[SolveTime], p: f64) -> SolveTime {
    if times.is_empty() {
        return SolveTime::Dnf;
    }
    let mut sorted = times.to_vec();
    sorted.sort();

    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    match (sorted[lower], sorted[upper]) {
        (SolveTime::Finished(a), SolveTime::Finished(b)) => {
            let fraction = rank - lower as f64;
            SolveTime::Finished((a as f64 + fraction * (b - a) as f64).round() as i64)
        }
        _ => SolveTime::Dnf,
    }
}

/// Population standard deviation of finished times
pub(crate) fn population_std_dev(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<i64>() as f64 / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}

/// Population standard deviation, rounded to the millisecond
pub fn standard_deviation(times: &[SolveTime]) -> SolveTime {
    match finished(times) {
        Some(values) if !values.is_empty() => {
            SolveTime::Finished(population_std_dev(&values).round() as i64)
        }
        _ => SolveTime::Dnf,
    }
}

/// Mean of the times strictly between the first and third quartile
///
/// Falls back to the median when no time lies strictly between the
/// quartiles (e.g. two solves, or all times equal).
pub fn interquartile_mean(times: &[SolveTime]) -> SolveTime {
    if times.is_empty() {
        return SolveTime::Dnf;
    }
    let (Some(q1), Some(q3)) = (percentile(times, 0.25).millis(), percentile(times, 0.75).millis())
    else {
        return SolveTime::Dnf;
    };

    let mut sum = 0i64;
    let mut count = 0i64;
    for time in times {
        match time {
            SolveTime::Finished(ms) if q1 < *ms && *ms < q3 => {
                sum += ms;
                count += 1;
            }
            SolveTime::Finished(_) => {}
            // Above every finished quartile bound
            SolveTime::Dnf => {}
        }
    }

    if count == 0 {
        percentile(times, 0.5)
    } else {
        SolveTime::Finished(sum / count)
    }
}

/// Best value of `aggregate` over every window of `size` consecutive solves
///
/// Ties resolve to the older window, so position 0 is only reported when
/// the most recent window is strictly better than all others.
pub fn best_window(
    times: &[SolveTime],
    size: usize,
    aggregate: fn(&[SolveTime]) -> SolveTime,
) -> Option<MeasureValue> {
    if size == 0 || times.len() < size {
        return None;
    }

    let mut best: Option<MeasureValue> = None;
    for (position, window) in times.windows(size).enumerate() {
        let value = aggregate(window);
        if best.map_or(true, |b| value <= b.value) {
            best = Some(MeasureValue {
                value,
                window_position: position,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::model::SolveTime::{Dnf, Finished};

    fn ms(values: &[i64]) -> Vec<SolveTime> {
        values.iter().map(|&v| Finished(v)).collect()
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&ms(&[1000, 2000, 3001])), Finished(2000));
        assert_eq!(mean(&[Finished(1000), Dnf]), Dnf);
        assert_eq!(mean(&[]), Dnf);
    }

    #[test]
    fn test_average_trims_best_and_worst() {
        assert_eq!(average(&ms(&[1000, 2000, 3000])), Finished(2000));
        assert_eq!(average(&ms(&[5000, 1000, 2000, 9000, 3000])), Finished(3333));
    }

    #[test]
    fn test_average_dnf_and_short_windows() {
        assert_eq!(average(&[Finished(1000), Dnf, Finished(3000)]), Dnf);
        assert_eq!(average(&ms(&[1000, 2000])), Dnf);
    }

    #[test]
    fn test_best_and_worst_positions() {
        let times = vec![Finished(3000), Finished(1000), Dnf, Finished(1000)];
        assert_eq!(
            best(&times),
            MeasureValue {
                value: Finished(1000),
                window_position: 3
            }
        );
        assert_eq!(
            worst(&times),
            MeasureValue {
                value: Dnf,
                window_position: 2
            }
        );
        assert_eq!(best(&ms(&[900])).window_position, 0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let times = ms(&[4000, 1000, 3000, 2000]);
        assert_eq!(percentile(&times, 0.0), Finished(1000));
        assert_eq!(percentile(&times, 1.0), Finished(4000));
        // rank 1.5 between 2000 and 3000
        assert_eq!(percentile(&times, 0.5), Finished(2500));
        // rank 0.75
        assert_eq!(percentile(&times, 0.25), Finished(1750));
    }

    #[test]
    fn test_percentile_dnf_neighbour() {
        let times = vec![Finished(1000), Dnf];
        assert_eq!(percentile(&times, 0.0), Finished(1000));
        assert_eq!(percentile(&times, 0.5), Dnf);
        assert_eq!(percentile(&times, 1.0), Dnf);
    }

    #[test]
    fn test_standard_deviation() {
        let values = [2000, 4000, 4000, 4000, 5000, 5000, 7000, 9000];
        assert_relative_eq!(population_std_dev(&values), 2000.0, epsilon = 1e-9);
        assert_eq!(standard_deviation(&ms(&values)), Finished(2000));
        assert_eq!(standard_deviation(&ms(&[1000, 2000])), Finished(500));
        assert_eq!(standard_deviation(&[Finished(1000), Dnf]), Dnf);
    }

    #[test]
    fn test_interquartile_mean() {
        // Q1 = 3250, Q3 = 7750 over 1000..=10000
        let times = ms(&[10000, 1000, 9000, 2000, 8000, 3000, 7000, 4000, 6000, 5000]);
        assert_eq!(interquartile_mean(&times), Finished(5500));
    }

    #[test]
    fn test_interquartile_mean_falls_back_to_median() {
        assert_eq!(interquartile_mean(&ms(&[1000, 3000])), Finished(2000));
        assert_eq!(interquartile_mean(&ms(&[1500, 1500, 1500])), Finished(1500));
    }

    #[test]
    fn test_interquartile_mean_dnf() {
        // Upper quartile falls between two DNFs
        let times = vec![Finished(1000), Finished(2000), Dnf, Dnf, Dnf];
        assert_eq!(interquartile_mean(&times), Dnf);
        // DNF beyond the upper quartile is not needed
        let times = vec![
            Finished(1000),
            Finished(2000),
            Finished(3000),
            Finished(4000),
            Dnf,
        ];
        assert_eq!(interquartile_mean(&times), Finished(3000));
    }

    #[test]
    fn test_best_window_ties_go_older() {
        let times = ms(&[3000, 2900, 2800, 3100, 2800, 2900, 3000]);
        let value = best_window(&times, 3, mean).unwrap();
        assert_eq!(value.value, Finished(2900));
        assert_eq!(value.window_position, 4);
        assert!(!value.is_record());
    }

    #[test]
    fn test_best_window_record() {
        let times = ms(&[2700, 2900, 2800, 3100, 2800, 2900, 3000]);
        let value = best_window(&times, 3, mean).unwrap();
        assert_eq!(value.window_position, 0);
        assert!(value.is_record());
    }

    #[test]
    fn test_best_window_too_short() {
        assert_eq!(best_window(&ms(&[1000]), 3, mean), None);
    }

    #[test]
    fn test_evaluate_window_sizes() {
        let times = ms(&[1000, 2000, 3000, 10000]);
        assert_eq!(Measure::average(5, 5).evaluate(&times), None);
        assert_eq!(
            Measure::average(3, 3).evaluate(&times).unwrap().value,
            Finished(2000)
        );
        assert_eq!(
            Measure::mean(1, usize::MAX).evaluate(&times).unwrap().value,
            Finished(4000)
        );
        assert_eq!(
            Measure::new(MeasureKind::Best, 1, usize::MAX)
                .evaluate(&times)
                .unwrap(),
            MeasureValue {
                value: Finished(1000),
                window_position: 0
            }
        );
    }

    #[test]
    fn test_description() {
        assert_eq!(Measure::average(5, 5).description(), "Average (last 5)");
        assert_eq!(Measure::mean(1, usize::MAX).description(), "Mean");
        assert_eq!(Measure::best_average(12).description(), "Best average of 12");
        assert_eq!(
            Measure::new(MeasureKind::Percentile(0.5), 1, usize::MAX).description(),
            "Median"
        );
    }
}
