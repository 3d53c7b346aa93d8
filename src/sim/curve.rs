//! Per-millisecond probability of looking at the target for one trial.

use super::effects::{ItemEffects, Ms, ParticipantEffects, TrialNoise};
use super::sigmoid::{self, Diagnostics};
use crate::config::GeneratorConfig;

/// Simulated lead-in before the recorded trial, discarded from the output.
pub const PRETRIAL_BUFFER_MS: usize = 1000;
/// Simulated tail after the trial; only kept when the divergence point is forced.
pub const POSTTRIAL_BUFFER_MS: usize = 500;

/// The three scopes of random effects that shape one trial.
#[derive(Clone, Copy, Debug)]
pub struct TrialEffects<'a> {
    pub participant: &'a ParticipantEffects,
    pub item: &'a ItemEffects,
    pub noise: &'a TrialNoise,
}

impl TrialEffects<'_> {
    /// Additive shift applied to every millisecond of the curve.
    pub fn probability_offset(&self) -> f64 {
        self.noise.prob_noise
            + self.noise.subj_bias_variation
            + self.participant.bias_toward_target
            + self.item.prob_bias
    }

    /// Speed effects fed to the sigmoid divisor.
    pub fn dspeed_effects(&self) -> [f64; 4] {
        [
            self.noise.dspeed_noise,
            self.noise.subj_dspeed_variation,
            self.participant.dspeed_bias,
            self.item.dspeed_bias,
        ]
    }
}

/// Divergence moment in simulated-trial time (pretrial buffer included).
/// `condition` is the zero-based condition index.
pub fn divergence_moment(
    cfg: &GeneratorConfig,
    pretrial_buffer: usize,
    condition: u32,
    fx: &TrialEffects<'_>,
) -> Ms {
    let cond = Ms::from(condition);
    // Saturating: large SDs can draw effects near the `Ms` limits.
    let slope = cfg
        .dataset
        .cond_effect
        .saturating_add(fx.participant.dpoint_slope);
    [
        cfg.dataset.dpoint,
        fx.noise.dp_noise,
        cond.saturating_mul(slope),
        fx.participant.dpoint_intercept,
        fx.noise.subj_dp_variation,
        fx.item.dpoint_bias,
    ]
    .into_iter()
    .fold(pretrial_buffer as Ms, Ms::saturating_add)
}

/// Target-look probability per millisecond. Values are not clamped: a value
/// at or above 1 always yields a target look, at or below 0 never does.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilityCurve {
    pub divergence_moment: Ms,
    pub values: Vec<f64>,
    /// The sigmoid divisor was not positive and the fallback form was used.
    pub degenerate: bool,
}

impl ProbabilityCurve {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Build the curve for `len` simulated milliseconds.
pub fn build_curve(
    cfg: &GeneratorConfig,
    pretrial_buffer: usize,
    len: usize,
    condition: u32,
    fx: &TrialEffects<'_>,
    diagnostics: &mut Diagnostics,
) -> ProbabilityCurve {
    let moment = divergence_moment(cfg, pretrial_buffer, condition, fx);
    let offset = fx.probability_offset();
    let flat = 0.5 + offset;
    let slow_factor = cfg.dataset.dspeed_slow_factor;
    let speed = fx.dspeed_effects();

    let degenerate = sigmoid::divisor(slow_factor, &speed) <= 0.0;
    if degenerate {
        diagnostics.degenerate_divisor(slow_factor, &speed);
    }

    let values = (0..len as Ms)
        .map(|t| {
            if t < moment {
                flat
            } else {
                sigmoid::probability_increment(t.saturating_sub(moment) as f64, slow_factor, &speed) + offset
            }
        })
        .collect();

    ProbabilityCurve {
        divergence_moment: moment,
        values,
        degenerate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn effects() -> (ParticipantEffects, ItemEffects, TrialNoise) {
        let subj = ParticipantEffects {
            bias_toward_target: 0.02,
            dspeed_bias: 1.0,
            dpoint_intercept: 12,
            dpoint_slope: -7,
            ..ParticipantEffects::default()
        };
        let item = ItemEffects {
            dpoint_bias: 5,
            prob_bias: -0.01,
            dspeed_bias: 2.0,
        };
        let noise = TrialNoise {
            dp_noise: -3,
            prob_noise: 0.03,
            dspeed_noise: -1.5,
            subj_dp_variation: 4,
            subj_bias_variation: 0.005,
            subj_dspeed_variation: 0.5,
        };
        (subj, item, noise)
    }

    #[test]
    fn divergence_moment_sums_every_offset() {
        let mut cfg = GeneratorConfig::default();
        cfg.dataset.dpoint = 300;
        cfg.dataset.cond_effect = 100;
        let (subj, item, noise) = effects();
        let fx = TrialEffects {
            participant: &subj,
            item: &item,
            noise: &noise,
        };
        // condition 0 has no condition-effect or slope contribution
        assert_eq!(
            divergence_moment(&cfg, 1000, 0, &fx),
            1000 + 300 - 3 + 12 + 4 + 5
        );
        assert_eq!(
            divergence_moment(&cfg, 1000, 2, &fx),
            1000 + 300 - 3 + 2 * (100 - 7) + 12 + 4 + 5
        );
    }

    #[test]
    fn zero_effects_give_flat_half_then_rising_curve() {
        let mut cfg = GeneratorConfig::default();
        cfg.dataset.dpoint = 100;
        let subj = ParticipantEffects::default();
        let item = ItemEffects::default();
        let noise = TrialNoise::default();
        let fx = TrialEffects {
            participant: &subj,
            item: &item,
            noise: &noise,
        };
        let mut diag = Diagnostics::new();
        let curve = build_curve(&cfg, 1000, 1500, 0, &fx, &mut diag);
        assert_eq!(curve.len(), 1500);
        assert_eq!(curve.divergence_moment, 1100);
        assert!(!curve.degenerate);
        assert!(curve.values[..1100].iter().all(|&p| p == 0.5));
        assert_abs_diff_eq!(curve.values[1100], 0.5, epsilon = 1e-12);
        for w in curve.values[1100..].windows(2) {
            assert!(w[1] >= w[0]);
        }
        assert!(curve.values[1499] > 0.99);
        assert_eq!(diag.degenerate_trials(), 0);
    }

    #[test]
    fn offset_shifts_whole_curve_without_clamping() {
        let mut cfg = GeneratorConfig::default();
        cfg.dataset.dpoint = 0;
        let subj = ParticipantEffects {
            bias_toward_target: 0.4,
            ..ParticipantEffects::default()
        };
        let item = ItemEffects {
            prob_bias: 0.3,
            ..ItemEffects::default()
        };
        let noise = TrialNoise::default();
        let fx = TrialEffects {
            participant: &subj,
            item: &item,
            noise: &noise,
        };
        let mut diag = Diagnostics::new();
        let curve = build_curve(&cfg, 10, 400, 0, &fx, &mut diag);
        assert_abs_diff_eq!(curve.values[0], 1.2, epsilon = 1e-12);
        assert!(curve.values[399] > 1.6);
    }

    #[test]
    fn negative_moment_starts_curve_mid_sigmoid() {
        let mut cfg = GeneratorConfig::default();
        cfg.dataset.dpoint = -50;
        let subj = ParticipantEffects::default();
        let item = ItemEffects::default();
        let noise = TrialNoise::default();
        let fx = TrialEffects {
            participant: &subj,
            item: &item,
            noise: &noise,
        };
        let mut diag = Diagnostics::new();
        let curve = build_curve(&cfg, 0, 100, 0, &fx, &mut diag);
        assert_eq!(curve.divergence_moment, -50);
        let expected = sigmoid::probability_increment(50.0, 50.0, &[0.0; 4]);
        assert_abs_diff_eq!(curve.values[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_divisor_is_reported_not_fatal() {
        let mut cfg = GeneratorConfig::default();
        cfg.dataset.dspeed_slow_factor = 5.0;
        cfg.dataset.dpoint = 0;
        let subj = ParticipantEffects {
            dspeed_bias: -30.0,
            ..ParticipantEffects::default()
        };
        let item = ItemEffects::default();
        let noise = TrialNoise::default();
        let fx = TrialEffects {
            participant: &subj,
            item: &item,
            noise: &noise,
        };
        let mut diag = Diagnostics::new();
        let curve = build_curve(&cfg, 0, 200, 0, &fx, &mut diag);
        assert!(curve.degenerate);
        assert!(curve.values.iter().all(|p| p.is_finite()));
        assert_eq!(diag.degenerate_trials(), 1);
        assert_eq!(diag.warnings_emitted(), 1);
    }

    #[test]
    fn extreme_offsets_saturate_instead_of_overflowing() {
        let mut cfg = GeneratorConfig::default();
        cfg.dataset.dpoint = crate::config::MAX_MS_OFFSET;
        cfg.dataset.cond_effect = crate::config::MAX_MS_OFFSET;
        let subj = ParticipantEffects {
            dpoint_intercept: Ms::MAX,
            ..ParticipantEffects::default()
        };
        let item = ItemEffects::default();
        let noise = TrialNoise::default();
        let fx = TrialEffects {
            participant: &subj,
            item: &item,
            noise: &noise,
        };
        assert_eq!(divergence_moment(&cfg, PRETRIAL_BUFFER_MS, u32::MAX, &fx), Ms::MAX);
        let mut diag = Diagnostics::new();
        let curve = build_curve(&cfg, PRETRIAL_BUFFER_MS, 50, 1, &fx, &mut diag);
        assert!(curve.values.iter().all(|&p| p == 0.5));
    }
}
