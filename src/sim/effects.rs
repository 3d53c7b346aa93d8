//! Gaussian random effects at population, participant and item scope.
//!
//! Divergence-point effects are whole milliseconds (truncated toward zero);
//! probability and speed effects stay continuous.

use std::collections::HashMap;

use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::GeneratorConfig;

/// Milliseconds relative to trial start.
pub type Ms = i64;

/// Draw `mean + sd * z`. One normal variate is consumed even when `sd == 0`,
/// in which case `mean` is returned exactly.
pub fn gauss<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    if sd == 0.0 {
        return mean;
    }
    mean + sd * z
}

/// Zero-mean draw truncated to whole milliseconds.
pub fn gauss_ms<R: Rng + ?Sized>(rng: &mut R, sd: f64) -> Ms {
    gauss(rng, 0.0, sd).trunc() as Ms
}

/// Effects drawn once per participant and reused for all of their trials.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParticipantEffects {
    /// SDs of this participant's own trial-to-trial variation. A negative
    /// draw is used as-is: `sd * z` is symmetric in the sign of `sd`.
    pub per_trial_dpoint_sd: f64,
    pub per_trial_bias_sd: f64,
    pub per_trial_dspeed_sd: f64,
    pub bias_toward_target: f64,
    pub dspeed_bias: f64,
    pub outmonitor_look_bias: f64,
    pub dpoint_intercept: Ms,
    pub dpoint_slope: Ms,
}

impl ParticipantEffects {
    pub fn draw<R: Rng + ?Sized>(rng: &mut R, cfg: &GeneratorConfig) -> Self {
        let per_trial = &cfg.subject_per_trial;
        let subj = &cfg.subject;
        let per_trial_dpoint_sd = gauss(rng, 0.0, per_trial.subj_per_trial_dpoint_var_sd);
        let per_trial_bias_sd = gauss(rng, 0.0, per_trial.subj_per_trial_bias_var_sd);
        let per_trial_dspeed_sd = gauss(rng, 0.0, per_trial.subj_per_trial_dspeed_var_sd);
        let bias_toward_target = gauss(rng, 0.0, subj.subj_bias_var_sd);
        let dspeed_bias = gauss(rng, 0.0, subj.subj_dspeed_bias_var_sd);
        let outmonitor_look_bias = gauss(rng, 0.0, subj.subj_outmonitor_look_bias_sd);
        let dpoint_intercept = gauss_ms(rng, subj.subj_dpoint_rand_intercept_sd);
        let dpoint_slope = gauss_ms(rng, subj.subj_dpoint_rand_slope_sd);
        Self {
            per_trial_dpoint_sd,
            per_trial_bias_sd,
            per_trial_dspeed_sd,
            bias_toward_target,
            dspeed_bias,
            outmonitor_look_bias,
            dpoint_intercept,
            dpoint_slope,
        }
    }

    /// Probability of looking away at each fixation onset.
    pub fn away_probability(&self, cfg: &GeneratorConfig) -> f64 {
        cfg.dataset.outmonitor_look_prob + self.outmonitor_look_bias
    }
}

/// An item is the stimulus pair shown at a given trial index of a given condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub condition: u32,
    pub trial: u32,
}

/// Latent biases of one item, shared by every participant who sees it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ItemEffects {
    pub dpoint_bias: Ms,
    pub prob_bias: f64,
    pub dspeed_bias: f64,
}

impl ItemEffects {
    pub fn draw<R: Rng + ?Sized>(rng: &mut R, cfg: &GeneratorConfig) -> Self {
        let dpoint_bias = gauss_ms(rng, cfg.item.item_dpoint_bias_sd);
        let prob_bias = gauss(rng, 0.0, cfg.item.item_prob_bias_sd);
        let dspeed_bias = gauss(rng, 0.0, cfg.item.item_dspeed_bias_sd);
        Self {
            dpoint_bias,
            prob_bias,
            dspeed_bias,
        }
    }
}

/// Memo of item effects for one dataset. The first request for a key draws
/// it; later requests return the stored value and consume no randomness.
#[derive(Clone, Debug, Default)]
pub struct ItemEffectCache {
    items: HashMap<ItemKey, ItemEffects>,
}

impl ItemEffectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_draw<R: Rng + ?Sized>(
        &mut self,
        key: ItemKey,
        rng: &mut R,
        cfg: &GeneratorConfig,
    ) -> ItemEffects {
        *self
            .items
            .entry(key)
            .or_insert_with(|| ItemEffects::draw(rng, cfg))
    }

    pub fn get(&self, key: ItemKey) -> Option<ItemEffects> {
        self.items.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Noise redrawn for every trial, including the participant-specific part.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrialNoise {
    pub dp_noise: Ms,
    pub prob_noise: f64,
    pub dspeed_noise: f64,
    pub subj_dp_variation: Ms,
    pub subj_bias_variation: f64,
    pub subj_dspeed_variation: f64,
}

impl TrialNoise {
    pub fn draw<R: Rng + ?Sized>(
        rng: &mut R,
        cfg: &GeneratorConfig,
        subj: &ParticipantEffects,
    ) -> Self {
        let noise = &cfg.trial_noise;
        let dp_noise = gauss_ms(rng, noise.rand_dp_noise_sd);
        let prob_noise = gauss(rng, 0.0, noise.rand_prob_noise_sd);
        let dspeed_noise = gauss(rng, 0.0, noise.rand_dspeed_noise_sd);
        let subj_dp_variation = gauss_ms(rng, subj.per_trial_dpoint_sd);
        let subj_bias_variation = gauss(rng, 0.0, subj.per_trial_bias_sd);
        let subj_dspeed_variation = gauss(rng, 0.0, subj.per_trial_dspeed_sd);
        Self {
            dp_noise,
            prob_noise,
            dspeed_noise,
            subj_dp_variation,
            subj_bias_variation,
            subj_dspeed_variation,
        }
    }
}
