//! Empirical divergence point and the global re-centering shift.
//!
//! Per (participant, time, condition) the mean target-look indicator is taken
//! over that participant's trials; per (time, condition) those means are
//! tested against 0.5 with a one-sample t-test. The divergence point is the
//! start of the first run of `DPA_RUN_MS` consecutive condition-0 milliseconds
//! with `t > T_CRITICAL`.

use std::collections::BTreeMap;

use super::dataset::{Dataset, LookObject};
use super::effects::Ms;

/// Consecutive significant milliseconds required to call a divergence.
pub const DPA_RUN_MS: Ms = 200;
pub const T_CRITICAL: f64 = 1.96;
pub const NULL_MEAN: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CorrectionError {
    #[error(
        "no run of {run} ms with t > {critical} found for condition 0; \
         the population may be too small or the noise too high"
    )]
    DivergenceNotFound { run: Ms, critical: f64 },
}

impl CorrectionError {
    fn not_found() -> Self {
        Self::DivergenceNotFound {
            run: DPA_RUN_MS,
            critical: T_CRITICAL,
        }
    }
}

/// t-statistic of one (time, condition) cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TStat {
    pub time: Ms,
    pub condition: u32,
    pub t: f64,
}

/// One-sample t-statistic against `popmean`. Zero variance gives ±inf (or
/// NaN when the mean equals `popmean`); fewer than two values give NaN.
pub fn one_sample_t(values: &[f64], popmean: f64) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
    let diff = mean - popmean;
    if var == 0.0 {
        return if diff > 0.0 {
            f64::INFINITY
        } else if diff < 0.0 {
            f64::NEG_INFINITY
        } else {
            f64::NAN
        };
    }
    diff / (var.sqrt() / (n as f64).sqrt())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct LookCount {
    looks: u32,
    samples: u32,
}

/// Target-look counts keyed by (time, condition, participant). Filled either
/// from table rows or directly from simulated trials.
#[derive(Clone, Debug, Default)]
pub struct LookAccumulator {
    cells: BTreeMap<(Ms, u32, u32), LookCount>,
}

impl LookAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, participant: u32, condition: u32, time: Ms, looking_at_target: bool) {
        let cell = self.cells.entry((time, condition, participant)).or_default();
        cell.samples += 1;
        if looking_at_target {
            cell.looks += 1;
        }
    }

    pub fn from_dataset(dataset: &Dataset) -> Self {
        let mut acc = Self::new();
        for row in dataset
            .rows
            .iter()
            .filter(|r| r.object == LookObject::Target)
        {
            acc.add(row.participant, row.condition, row.time, row.is_looking == 1);
        }
        acc
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// t-statistics for every (time, condition), sorted by time then condition.
    pub fn t_statistics(&self) -> Vec<TStat> {
        let mut out = Vec::new();
        let mut means: Vec<f64> = Vec::new();
        let mut current: Option<(Ms, u32)> = None;
        for (&(time, condition, _), cell) in &self.cells {
            if current != Some((time, condition)) {
                if let Some((t_prev, c_prev)) = current {
                    out.push(TStat {
                        time: t_prev,
                        condition: c_prev,
                        t: one_sample_t(&means, NULL_MEAN),
                    });
                }
                means.clear();
                current = Some((time, condition));
            }
            means.push(f64::from(cell.looks) / f64::from(cell.samples));
        }
        if let Some((time, condition)) = current {
            out.push(TStat {
                time,
                condition,
                t: one_sample_t(&means, NULL_MEAN),
            });
        }
        out
    }

    pub fn estimate_divergence_point(&self) -> Result<Ms, CorrectionError> {
        find_divergence_point(&self.t_statistics()).ok_or_else(CorrectionError::not_found)
    }
}

/// Scan condition-0 statistics in time order for the first qualifying run.
pub fn find_divergence_point(stats: &[TStat]) -> Option<Ms> {
    let mut run = 0;
    for stat in stats.iter().filter(|s| s.condition == 0) {
        if stat.t > T_CRITICAL {
            run += 1;
        } else {
            run = 0;
        }
        if run >= DPA_RUN_MS {
            return Some(stat.time - DPA_RUN_MS);
        }
    }
    None
}

pub fn t_statistics(dataset: &Dataset) -> Vec<TStat> {
    LookAccumulator::from_dataset(dataset).t_statistics()
}

pub fn estimate_divergence_point(dataset: &Dataset) -> Result<Ms, CorrectionError> {
    LookAccumulator::from_dataset(dataset).estimate_divergence_point()
}

/// Shift every row by `offset` ms and keep `0 <= time < trial_len`.
pub fn shift_and_trim(dataset: &mut Dataset, offset: Ms) {
    let trial_len = dataset.trial_len as Ms;
    dataset.rows.retain_mut(|row| {
        row.time += offset;
        (0..trial_len).contains(&row.time)
    });
}

/// Re-center `dataset` so its empirical divergence point lands on `target_dpoint`.
pub fn correct(mut dataset: Dataset, target_dpoint: Ms) -> Result<Dataset, CorrectionError> {
    let empirical = estimate_divergence_point(&dataset)?;
    shift_and_trim(&mut dataset, target_dpoint - empirical);
    Ok(dataset)
}
