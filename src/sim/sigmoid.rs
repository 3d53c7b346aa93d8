//! Post-divergence target-look probability.
//!
//! `p(x) = 1 / (1 + e^(-x/d))` with `d = slow_factor + sum(effects)`. The
//! random effects can push `d` to zero or below; the curve then uses the
//! `e^(x/d) / (1 + e^(x/d))` form, which does not overflow for `x/d <= 0`.

use std::collections::HashSet;

use tracing::warn;

/// Speed effects in the order they are summed into the divisor.
pub const DSPEED_EFFECT_NAMES: [&str; 4] = [
    "rand_dspeed_noise_sd",
    "subj_per_trial_dspeed_var_sd",
    "subj_dspeed_bias_var_sd",
    "item_dspeed_bias_sd",
];

#[inline]
pub fn divisor(slow_factor: f64, effects: &[f64; 4]) -> f64 {
    slow_factor + effects.iter().sum::<f64>()
}

/// Probability increment `elapsed_ms` after the divergence point.
pub fn probability_increment(elapsed_ms: f64, slow_factor: f64, effects: &[f64; 4]) -> f64 {
    let d = divisor(slow_factor, effects);
    if d > 0.0 {
        1.0 / (1.0 + (-elapsed_ms / d).exp())
    } else if d < 0.0 {
        let e = (elapsed_ms / d).exp();
        e / (1.0 + e)
    } else if elapsed_ms == 0.0 {
        0.5
    } else {
        // Limit of the fallback form as d -> 0 from below.
        0.0
    }
}

/// Collects degenerate-divisor reports for one generator run. A warning is
/// logged once per configured slow factor and blamed field; every trial is
/// still counted.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    seen: HashSet<(u64, &'static str)>,
    degenerate_trials: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trial whose divisor is not positive. Returns `true` when a
    /// warning was emitted for this signature.
    pub fn degenerate_divisor(&mut self, slow_factor: f64, effects: &[f64; 4]) -> bool {
        self.degenerate_trials += 1;
        let (worst_idx, worst) = effects
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::INFINITY), |acc, (i, v)| if v < acc.1 { (i, v) } else { acc });
        let field = DSPEED_EFFECT_NAMES[worst_idx];
        if !self.seen.insert((slow_factor.to_bits(), field)) {
            return false;
        }
        warn!(
            slow_factor,
            random_dspeed_noise = effects[0],
            subj_per_trial_dspeed_var = effects[1],
            subj_dspeed_bias = effects[2],
            item_dspeed_bias = effects[3],
            "sigmoid divisor {:.3} is not positive; increase `dspeed_slow_factor` \
             or decrease `{}` (largest negative contribution {:.3}). \
             Using the stable fallback curve; further trials blaming this field \
             are only counted.",
            divisor(slow_factor, effects),
            field,
            worst,
        );
        true
    }

    /// Trials that used the fallback curve.
    pub fn degenerate_trials(&self) -> usize {
        self.degenerate_trials
    }

    /// Distinct (slow factor, field) signatures warned about.
    pub fn warnings_emitted(&self) -> usize {
        self.seen.len()
    }
}
