use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Errors raised while loading or validating a [`GeneratorConfig`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`{field}` must be a finite, non-negative standard deviation (got {value})")]
    InvalidSd { field: &'static str, value: f64 },
    #[error("`{field}` must be at least 1")]
    ZeroCount { field: &'static str },
    #[error("`{field}` must be finite (got {value})")]
    NonFinite { field: &'static str, value: f64 },
    #[error("`{field}` must lie within [0, 1] (got {value})")]
    OutOfUnitRange { field: &'static str, value: f64 },
    #[error("`{field}` must lie within ±{limit} ms (got {value})")]
    MsOutOfRange {
        field: &'static str,
        value: i64,
        limit: i64,
    },
    #[error("`n_subjs` ({n_subjs}) times `population_multiplier` ({multiplier}) overflows")]
    PopulationOverflow { n_subjs: u32, multiplier: u32 },
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("`{field}` expects a non-negative integer (got {value})")]
    NotAnInteger { field: String, value: f64 },
    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "DatasetConfig::default_n_subjs")]
    pub n_subjs: u32,
    #[serde(default = "DatasetConfig::default_n_conds")]
    pub n_conds: u32,
    #[serde(default = "DatasetConfig::default_n_trials")]
    pub n_trials: u32,
    /// Trial length in milliseconds.
    #[serde(default = "DatasetConfig::default_trial_len")]
    pub trial_len: usize,
    /// Divergence point of condition 0, in ms.
    #[serde(default = "DatasetConfig::default_dpoint")]
    pub dpoint: i64,
    /// Delay added to the divergence point per condition index, in ms.
    #[serde(default = "DatasetConfig::default_cond_effect")]
    pub cond_effect: i64,
    #[serde(default = "DatasetConfig::default_dspeed_slow_factor")]
    pub dspeed_slow_factor: f64,
    #[serde(default = "DatasetConfig::default_outmonitor_look_prob")]
    pub outmonitor_look_prob: f64,
}

impl DatasetConfig {
    fn default_n_subjs() -> u32 {
        50
    }
    fn default_n_conds() -> u32 {
        2
    }
    fn default_n_trials() -> u32 {
        12
    }
    fn default_trial_len() -> usize {
        1000
    }
    fn default_dpoint() -> i64 {
        300
    }
    fn default_cond_effect() -> i64 {
        150
    }
    fn default_dspeed_slow_factor() -> f64 {
        50.0
    }
    fn default_outmonitor_look_prob() -> f64 {
        0.01
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            n_subjs: Self::default_n_subjs(),
            n_conds: Self::default_n_conds(),
            n_trials: Self::default_n_trials(),
            trial_len: Self::default_trial_len(),
            dpoint: Self::default_dpoint(),
            cond_effect: Self::default_cond_effect(),
            dspeed_slow_factor: Self::default_dspeed_slow_factor(),
            outmonitor_look_prob: Self::default_outmonitor_look_prob(),
        }
    }
}

/// Noise redrawn for every trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialNoiseConfig {
    #[serde(default = "TrialNoiseConfig::default_rand_dp_noise_sd")]
    pub rand_dp_noise_sd: f64,
    #[serde(default = "TrialNoiseConfig::default_rand_prob_noise_sd")]
    pub rand_prob_noise_sd: f64,
    #[serde(default = "TrialNoiseConfig::default_rand_dspeed_noise_sd")]
    pub rand_dspeed_noise_sd: f64,
}

impl TrialNoiseConfig {
    fn default_rand_dp_noise_sd() -> f64 {
        10.0
    }
    fn default_rand_prob_noise_sd() -> f64 {
        0.1
    }
    fn default_rand_dspeed_noise_sd() -> f64 {
        5.0
    }
}

impl Default for TrialNoiseConfig {
    fn default() -> Self {
        Self {
            rand_dp_noise_sd: Self::default_rand_dp_noise_sd(),
            rand_prob_noise_sd: Self::default_rand_prob_noise_sd(),
            rand_dspeed_noise_sd: Self::default_rand_dspeed_noise_sd(),
        }
    }
}

/// Spread of the per-participant SDs that drive each participant's own
/// trial-to-trial variability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectPerTrialConfig {
    #[serde(default = "SubjectPerTrialConfig::default_subj_per_trial_dpoint_var_sd")]
    pub subj_per_trial_dpoint_var_sd: f64,
    #[serde(default = "SubjectPerTrialConfig::default_subj_per_trial_bias_var_sd")]
    pub subj_per_trial_bias_var_sd: f64,
    #[serde(default = "SubjectPerTrialConfig::default_subj_per_trial_dspeed_var_sd")]
    pub subj_per_trial_dspeed_var_sd: f64,
}

impl SubjectPerTrialConfig {
    fn default_subj_per_trial_dpoint_var_sd() -> f64 {
        10.0
    }
    fn default_subj_per_trial_bias_var_sd() -> f64 {
        0.1
    }
    fn default_subj_per_trial_dspeed_var_sd() -> f64 {
        5.0
    }
}

impl Default for SubjectPerTrialConfig {
    fn default() -> Self {
        Self {
            subj_per_trial_dpoint_var_sd: Self::default_subj_per_trial_dpoint_var_sd(),
            subj_per_trial_bias_var_sd: Self::default_subj_per_trial_bias_var_sd(),
            subj_per_trial_dspeed_var_sd: Self::default_subj_per_trial_dspeed_var_sd(),
        }
    }
}

/// Effects drawn once per participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectConfig {
    #[serde(default = "SubjectConfig::default_subj_dpoint_rand_intercept_sd")]
    pub subj_dpoint_rand_intercept_sd: f64,
    #[serde(default = "SubjectConfig::default_subj_dpoint_rand_slope_sd")]
    pub subj_dpoint_rand_slope_sd: f64,
    #[serde(default = "SubjectConfig::default_subj_bias_var_sd")]
    pub subj_bias_var_sd: f64,
    #[serde(default = "SubjectConfig::default_subj_dspeed_bias_var_sd")]
    pub subj_dspeed_bias_var_sd: f64,
    #[serde(default = "SubjectConfig::default_subj_outmonitor_look_bias_sd")]
    pub subj_outmonitor_look_bias_sd: f64,
}

impl SubjectConfig {
    fn default_subj_dpoint_rand_intercept_sd() -> f64 {
        50.0
    }
    fn default_subj_dpoint_rand_slope_sd() -> f64 {
        50.0
    }
    fn default_subj_bias_var_sd() -> f64 {
        0.1
    }
    fn default_subj_dspeed_bias_var_sd() -> f64 {
        5.0
    }
    fn default_subj_outmonitor_look_bias_sd() -> f64 {
        0.004
    }
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            subj_dpoint_rand_intercept_sd: Self::default_subj_dpoint_rand_intercept_sd(),
            subj_dpoint_rand_slope_sd: Self::default_subj_dpoint_rand_slope_sd(),
            subj_bias_var_sd: Self::default_subj_bias_var_sd(),
            subj_dspeed_bias_var_sd: Self::default_subj_dspeed_bias_var_sd(),
            subj_outmonitor_look_bias_sd: Self::default_subj_outmonitor_look_bias_sd(),
        }
    }
}

/// Effects drawn once per (condition, trial index) item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemConfig {
    #[serde(default = "ItemConfig::default_item_dpoint_bias_sd")]
    pub item_dpoint_bias_sd: f64,
    #[serde(default = "ItemConfig::default_item_prob_bias_sd")]
    pub item_prob_bias_sd: f64,
    #[serde(default = "ItemConfig::default_item_dspeed_bias_sd")]
    pub item_dspeed_bias_sd: f64,
}

impl ItemConfig {
    fn default_item_dpoint_bias_sd() -> f64 {
        50.0
    }
    fn default_item_prob_bias_sd() -> f64 {
        0.1
    }
    fn default_item_dspeed_bias_sd() -> f64 {
        5.0
    }
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            item_dpoint_bias_sd: Self::default_item_dpoint_bias_sd(),
            item_prob_bias_sd: Self::default_item_prob_bias_sd(),
            item_dspeed_bias_sd: Self::default_item_dspeed_bias_sd(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Re-center the generated data so its empirical divergence point equals `dpoint`.
    #[serde(default)]
    pub force_dpoint: bool,
    /// Keep trials as compact gaze vectors until the shift is known.
    #[serde(default = "CorrectionConfig::default_memory_efficient")]
    pub memory_efficient: bool,
    /// Simulated population is `n_subjs * population_multiplier` when correcting.
    #[serde(default = "CorrectionConfig::default_population_multiplier")]
    pub population_multiplier: u32,
}

impl CorrectionConfig {
    fn default_memory_efficient() -> bool {
        true
    }
    fn default_population_multiplier() -> u32 {
        1
    }
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            force_dpoint: false,
            memory_efficient: Self::default_memory_efficient(),
            population_multiplier: Self::default_population_multiplier(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeneratorConfig {
    /// Numeric strings are used as-is; anything else is hashed. `None` seeds from entropy.
    #[serde(default)]
    pub rand_seed: Option<String>,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub trial_noise: TrialNoiseConfig,
    #[serde(default)]
    pub subject_per_trial: SubjectPerTrialConfig,
    #[serde(default)]
    pub subject: SubjectConfig,
    #[serde(default)]
    pub item: ItemConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Turn a user-supplied seed string into a `u64` seed.
pub fn seed_from_str(raw: &str) -> u64 {
    let trimmed = raw.trim();
    if let Ok(seed) = trimmed.parse::<u64>() {
        return seed;
    }
    trimmed.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

fn count_from_f64(field: &str, value: f64) -> Result<u64, ConfigError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(ConfigError::NotAnInteger {
            field: field.to_string(),
            value,
        });
    }
    Ok(value as u64)
}

/// Largest magnitude accepted for millisecond offsets such as `dpoint`.
pub const MAX_MS_OFFSET: i64 = i32::MAX as i64;

fn ms_from_f64(field: &str, value: f64) -> Result<i64, ConfigError> {
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > MAX_MS_OFFSET as f64 {
        return Err(ConfigError::NotAnInteger {
            field: field.to_string(),
            value,
        });
    }
    Ok(value as i64)
}

impl GeneratorConfig {
    /// Every standard-deviation parameter with its flat name.
    pub fn sd_fields(&self) -> [(&'static str, f64); 14] {
        [
            ("rand_dp_noise_sd", self.trial_noise.rand_dp_noise_sd),
            ("rand_prob_noise_sd", self.trial_noise.rand_prob_noise_sd),
            ("rand_dspeed_noise_sd", self.trial_noise.rand_dspeed_noise_sd),
            (
                "subj_per_trial_dpoint_var_sd",
                self.subject_per_trial.subj_per_trial_dpoint_var_sd,
            ),
            (
                "subj_per_trial_bias_var_sd",
                self.subject_per_trial.subj_per_trial_bias_var_sd,
            ),
            (
                "subj_per_trial_dspeed_var_sd",
                self.subject_per_trial.subj_per_trial_dspeed_var_sd,
            ),
            (
                "subj_dpoint_rand_intercept_sd",
                self.subject.subj_dpoint_rand_intercept_sd,
            ),
            (
                "subj_dpoint_rand_slope_sd",
                self.subject.subj_dpoint_rand_slope_sd,
            ),
            ("subj_bias_var_sd", self.subject.subj_bias_var_sd),
            ("subj_dspeed_bias_var_sd", self.subject.subj_dspeed_bias_var_sd),
            (
                "subj_outmonitor_look_bias_sd",
                self.subject.subj_outmonitor_look_bias_sd,
            ),
            ("item_dpoint_bias_sd", self.item.item_dpoint_bias_sd),
            ("item_prob_bias_sd", self.item.item_prob_bias_sd),
            ("item_dspeed_bias_sd", self.item.item_dspeed_bias_sd),
        ]
    }

    /// Reject configurations the simulation cannot run. Called before any draw.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in self.sd_fields() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidSd { field, value });
            }
        }
        let d = &self.dataset;
        for (field, count) in [
            ("n_subjs", d.n_subjs as usize),
            ("n_conds", d.n_conds as usize),
            ("n_trials", d.n_trials as usize),
            ("trial_len", d.trial_len),
            (
                "population_multiplier",
                self.correction.population_multiplier as usize,
            ),
        ] {
            if count == 0 {
                return Err(ConfigError::ZeroCount { field });
            }
        }
        for (field, value) in [("dpoint", d.dpoint), ("cond_effect", d.cond_effect)] {
            if value.unsigned_abs() > MAX_MS_OFFSET as u64 {
                return Err(ConfigError::MsOutOfRange {
                    field,
                    value,
                    limit: MAX_MS_OFFSET,
                });
            }
        }
        if d.n_subjs
            .checked_mul(self.correction.population_multiplier)
            .is_none()
        {
            return Err(ConfigError::PopulationOverflow {
                n_subjs: d.n_subjs,
                multiplier: self.correction.population_multiplier,
            });
        }
        if !d.dspeed_slow_factor.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "dspeed_slow_factor",
                value: d.dspeed_slow_factor,
            });
        }
        if !(0.0..=1.0).contains(&d.outmonitor_look_prob) {
            return Err(ConfigError::OutOfUnitRange {
                field: "outmonitor_look_prob",
                value: d.outmonitor_look_prob,
            });
        }
        Ok(())
    }

    /// Number of participants actually simulated (larger than `n_subjs` when correcting).
    pub fn population_size(&self) -> u32 {
        if self.correction.force_dpoint {
            // `validate` rejects products that overflow.
            self.dataset
                .n_subjs
                .saturating_mul(self.correction.population_multiplier)
        } else {
            self.dataset.n_subjs
        }
    }

    /// Resolve `rand_seed`, drawing a fresh one from entropy when unset.
    pub fn resolve_seed(&self) -> u64 {
        match &self.rand_seed {
            Some(raw) => seed_from_str(raw),
            None => rand::random(),
        }
    }

    /// Assign a numeric parameter by its flat name.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<(), ConfigError> {
        match name {
            "n_subjs" => self.dataset.n_subjs = count_from_f64(name, value)? as u32,
            "n_conds" => self.dataset.n_conds = count_from_f64(name, value)? as u32,
            "n_trials" => self.dataset.n_trials = count_from_f64(name, value)? as u32,
            "trial_len" => self.dataset.trial_len = count_from_f64(name, value)? as usize,
            "dpoint" => self.dataset.dpoint = ms_from_f64(name, value)?,
            "cond_effect" => self.dataset.cond_effect = ms_from_f64(name, value)?,
            "dspeed_slow_factor" => self.dataset.dspeed_slow_factor = value,
            "outmonitor_look_prob" => self.dataset.outmonitor_look_prob = value,
            "population_multiplier" => {
                self.correction.population_multiplier = count_from_f64(name, value)? as u32
            }
            "rand_dp_noise_sd" => self.trial_noise.rand_dp_noise_sd = value,
            "rand_prob_noise_sd" => self.trial_noise.rand_prob_noise_sd = value,
            "rand_dspeed_noise_sd" => self.trial_noise.rand_dspeed_noise_sd = value,
            "subj_per_trial_dpoint_var_sd" => {
                self.subject_per_trial.subj_per_trial_dpoint_var_sd = value
            }
            "subj_per_trial_bias_var_sd" => {
                self.subject_per_trial.subj_per_trial_bias_var_sd = value
            }
            "subj_per_trial_dspeed_var_sd" => {
                self.subject_per_trial.subj_per_trial_dspeed_var_sd = value
            }
            "subj_dpoint_rand_intercept_sd" => self.subject.subj_dpoint_rand_intercept_sd = value,
            "subj_dpoint_rand_slope_sd" => self.subject.subj_dpoint_rand_slope_sd = value,
            "subj_bias_var_sd" => self.subject.subj_bias_var_sd = value,
            "subj_dspeed_bias_var_sd" => self.subject.subj_dspeed_bias_var_sd = value,
            "subj_outmonitor_look_bias_sd" => self.subject.subj_outmonitor_look_bias_sd = value,
            "item_dpoint_bias_sd" => self.item.item_dpoint_bias_sd = value,
            "item_prob_bias_sd" => self.item.item_prob_bias_sd = value,
            "item_dspeed_bias_sd" => self.item.item_dspeed_bias_sd = value,
            _ => return Err(ConfigError::UnknownParameter(name.to_string())),
        }
        Ok(())
    }

    /// Read a numeric parameter by its flat name.
    pub fn param(&self, name: &str) -> Option<f64> {
        if let Some((_, value)) = self.sd_fields().into_iter().find(|(field, _)| *field == name) {
            return Some(value);
        }
        let d = &self.dataset;
        let value = match name {
            "n_subjs" => f64::from(d.n_subjs),
            "n_conds" => f64::from(d.n_conds),
            "n_trials" => f64::from(d.n_trials),
            "trial_len" => d.trial_len as f64,
            "dpoint" => d.dpoint as f64,
            "cond_effect" => d.cond_effect as f64,
            "dspeed_slow_factor" => d.dspeed_slow_factor,
            "outmonitor_look_prob" => d.outmonitor_look_prob,
            "population_multiplier" => f64::from(self.correction.population_multiplier),
            _ => return None,
        };
        Some(value)
    }

    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn format_f64_compact(x: f64) -> String {
        let mut s = format!("{:.6}", x);
        while s.contains('.') && s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        if s.is_empty() { "0".to_string() } else { s }
    }

    /// TOML text of `self` with every value commented out, keeping table headers.
    fn commented_toml(&self) -> Option<String> {
        let text = toml::to_string_pretty(self).ok()?;
        let mut commented = String::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                commented.push('\n');
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                commented.push_str(line);
                commented.push('\n');
            } else {
                let mut out_line = line.to_string();
                if let Some((lhs, rhs)) = line.split_once('=') {
                    let rhs_trim = rhs.trim();
                    if rhs_trim.contains('.') && !rhs_trim.contains('"') {
                        if let Ok(val) = rhs_trim.parse::<f64>() {
                            let mut formatted = Self::format_f64_compact(val);
                            if !formatted.contains('.') {
                                formatted.push_str(".0");
                            }
                            out_line = format!("{} = {}", lhs.trim(), formatted);
                        }
                    }
                }
                commented.push_str("# ");
                commented.push_str(&out_line);
                commented.push('\n');
            }
        }
        Some(commented)
    }

    /// Read `path` if it exists; otherwise write a commented defaults file and return defaults.
    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match Self::from_toml_str(&contents) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        warn!("Failed to parse config {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    warn!("Failed to read config {path}: {err}. Using defaults.");
                }
            }
            return Self::default();
        }

        let default_cfg = Self::default();
        match default_cfg.commented_toml() {
            Some(commented) => {
                if let Err(err) = fs::write(path_obj, commented) {
                    warn!("Failed to write default config to {path}: {err}");
                }
            }
            None => warn!("Failed to serialize default config; continuing with defaults"),
        }
        default_cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn unique_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "dpa_fakegen_config_test_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        p
    }

    #[test]
    fn defaults_validate() {
        assert_eq!(GeneratorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn huge_ms_offsets_from_toml_fail_validation() {
        let cfg = GeneratorConfig::from_toml_str(
            "[dataset]\nn_conds = 2\ncond_effect = 9223372036854775000\n",
        )
        .unwrap();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MsOutOfRange {
                field: "cond_effect",
                value: 9223372036854775000,
                limit: MAX_MS_OFFSET,
            })
        );

        let mut cfg = GeneratorConfig::default();
        cfg.dataset.dpoint = -(MAX_MS_OFFSET + 1);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("dpoint"));
        cfg.dataset.dpoint = -MAX_MS_OFFSET;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn overflowing_population_is_rejected() {
        let mut cfg = GeneratorConfig::default();
        cfg.dataset.n_subjs = 70_000;
        cfg.correction.population_multiplier = 70_000;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::PopulationOverflow {
                n_subjs: 70_000,
                multiplier: 70_000,
            })
        );
        cfg.correction.population_multiplier = 60_000;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn negative_sd_is_rejected_by_name() {
        let mut cfg = GeneratorConfig::default();
        cfg.item.item_prob_bias_sd = -0.5;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidSd {
                field: "item_prob_bias_sd",
                value: -0.5
            })
        );
    }

    #[test]
    fn zero_counts_are_rejected_by_name() {
        let mut cfg = GeneratorConfig::default();
        cfg.dataset.n_trials = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroCount { field: "n_trials" })
        );

        let mut cfg = GeneratorConfig::default();
        cfg.dataset.trial_len = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroCount { field: "trial_len" })
        );
    }

    #[test]
    fn set_param_checks_names_and_integers() {
        let mut cfg = GeneratorConfig::default();
        cfg.set_param("n_subjs", 8.0).unwrap();
        cfg.set_param("item_dspeed_bias_sd", 2.5).unwrap();
        cfg.set_param("dpoint", -20.0).unwrap();
        assert_eq!(cfg.dataset.n_subjs, 8);
        assert_eq!(cfg.item.item_dspeed_bias_sd, 2.5);
        assert_eq!(cfg.dataset.dpoint, -20);

        assert!(matches!(
            cfg.set_param("n_trials", 2.5),
            Err(ConfigError::NotAnInteger { .. })
        ));
        assert!(matches!(
            cfg.set_param("n_subjs", -1.0),
            Err(ConfigError::NotAnInteger { .. })
        ));
        assert_eq!(
            cfg.set_param("bogus", 1.0),
            Err(ConfigError::UnknownParameter("bogus".to_string()))
        );
    }

    #[test]
    fn seeds_from_numbers_and_words() {
        assert_eq!(seed_from_str("1234"), 1234);
        assert_eq!(seed_from_str(" 7 "), 7);
        assert_eq!(seed_from_str("abcd"), seed_from_str("abcd"));
        assert_ne!(seed_from_str("abcd"), seed_from_str("abce"));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = GeneratorConfig::from_toml_str(
            "rand_seed = \"42\"\n[dataset]\nn_subjs = 3\n[correction]\nforce_dpoint = true\n",
        )
        .unwrap();
        assert_eq!(cfg.rand_seed.as_deref(), Some("42"));
        assert_eq!(cfg.dataset.n_subjs, 3);
        assert_eq!(cfg.dataset.trial_len, 1000);
        assert!(cfg.correction.force_dpoint);
        assert!(cfg.correction.memory_efficient);
        assert_eq!(cfg.resolve_seed(), 42);
    }

    #[test]
    fn load_or_default_writes_defaults_cleanly() {
        let path = unique_path("defaults.toml");
        let path_str = path.to_string_lossy().to_string();
        let _ = fs::remove_file(&path);

        let cfg = GeneratorConfig::load_or_default(&path_str);
        assert!(path.exists(), "config file should be created");
        assert_eq!(cfg, GeneratorConfig::default());

        let contents = fs::read_to_string(&path).expect("read written config");
        assert!(contents.contains("[dataset]"));
        assert!(
            contents.contains("# n_subjs = 50"),
            "should write commented n_subjs"
        );
        assert!(
            contents.contains("# subj_outmonitor_look_bias_sd = 0.004"),
            "should write commented subj_outmonitor_look_bias_sd"
        );
        assert!(
            contents.contains("# dspeed_slow_factor = 50.0"),
            "should write commented dspeed_slow_factor"
        );

        // Everything is commented out, so reading it back yields defaults.
        let reread = GeneratorConfig::load_or_default(&path_str);
        assert_eq!(reread, GeneratorConfig::default());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_or_default_reads_existing() {
        let path = unique_path("custom.toml");
        let path_str = path.to_string_lossy().to_string();
        let mut custom = GeneratorConfig::default();
        custom.rand_seed = Some("abcd".to_string());
        custom.dataset.n_subjs = 12;
        custom.dataset.cond_effect = 90;
        custom.subject.subj_bias_var_sd = 0.02;
        custom.correction.force_dpoint = true;
        custom.correction.population_multiplier = 4;
        let text = toml::to_string_pretty(&custom).unwrap();
        fs::write(&path, text).unwrap();

        let cfg = GeneratorConfig::load_or_default(&path_str);
        assert_eq!(cfg, custom);
        assert_eq!(cfg.population_size(), 48);

        let _ = fs::remove_file(&path);
    }
}
