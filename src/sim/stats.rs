//! Summary figures over the fixation lengths of a generator run.

/// Fixation lengths of every simulated trial, in generation order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FixationLog {
    trials: Vec<Vec<usize>>,
}

impl FixationLog {
    pub fn push_trial(&mut self, lengths: Vec<usize>) {
        self.trials.push(lengths);
    }

    pub fn trials(&self) -> &[Vec<usize>] {
        &self.trials
    }

    pub fn all_lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.trials.iter().flatten().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

/// One row of the per-trial table. `*_nolast` leave out the final,
/// boundary-truncated fixation and are `None` when it was the only one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrialFixationStats {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub mean_nolast: Option<f64>,
    pub median_nolast: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverallFixationStats {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` with fewer than two fixations.
    pub sd: Option<f64>,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

fn sample_sd(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

fn as_f64(lengths: &[usize]) -> Vec<f64> {
    lengths.iter().map(|&l| l as f64).collect()
}

/// Stats of a single trial; `None` for a trial with no fixations.
pub fn trial_stats(lengths: &[usize]) -> Option<TrialFixationStats> {
    let values = as_f64(lengths);
    let head = &values[..values.len().saturating_sub(1)];
    Some(TrialFixationStats {
        max: values.iter().copied().reduce(f64::max)?,
        min: values.iter().copied().reduce(f64::min)?,
        mean: mean(&values)?,
        median: median(&values)?,
        mean_nolast: mean(head),
        median_nolast: median(head),
    })
}

pub fn per_trial_stats(log: &FixationLog) -> Vec<TrialFixationStats> {
    log.trials().iter().filter_map(|t| trial_stats(t)).collect()
}

/// Column-wise mean of the per-trial rows (the trailing row of the table).
pub fn aggregate_row(rows: &[TrialFixationStats]) -> Option<TrialFixationStats> {
    let column = |f: fn(&TrialFixationStats) -> f64| -> Option<f64> {
        mean(&rows.iter().map(f).collect::<Vec<_>>())
    };
    let optional = |f: fn(&TrialFixationStats) -> Option<f64>| -> Option<f64> {
        mean(&rows.iter().filter_map(f).collect::<Vec<_>>())
    };
    Some(TrialFixationStats {
        max: column(|r| r.max)?,
        min: column(|r| r.min)?,
        mean: column(|r| r.mean)?,
        median: column(|r| r.median)?,
        mean_nolast: optional(|r| r.mean_nolast),
        median_nolast: optional(|r| r.median_nolast),
    })
}

pub fn overall_stats(log: &FixationLog) -> Option<OverallFixationStats> {
    let values: Vec<f64> = log.all_lengths().map(|l| l as f64).collect();
    Some(OverallFixationStats {
        max: values.iter().copied().reduce(f64::max)?,
        min: values.iter().copied().reduce(f64::min)?,
        mean: mean(&values)?,
        median: median(&values)?,
        sd: sample_sd(&values),
    })
}
