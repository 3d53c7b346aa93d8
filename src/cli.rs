use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, GeneratorConfig};

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Generate fake eye-tracking data for Divergence Point Analysis.
///
/// Every numeric flag overrides the matching field of the config file.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML (written with commented defaults when missing)
    #[arg(long)]
    pub config: Option<String>,

    /// Output CSV for a single dataset
    #[arg(long = "out_file", default_value = "fake_data.csv")]
    pub out_file: PathBuf,

    /// Random seed; numbers are used as-is, other text is hashed
    #[arg(long = "rand_seed")]
    pub rand_seed: Option<String>,

    /// Shift the data so its empirical divergence point equals `dpoint`
    #[arg(long = "force_dpoint")]
    pub force_dpoint: bool,

    /// Streaming variant of divergence forcing (same output, less memory)
    #[arg(long = "force_dp_memory_efficient", num_args = 0..=1, default_missing_value = "true")]
    pub force_dp_memory_efficient: Option<bool>,

    /// Simulated population is n_subjs * population_multiplier when forcing
    #[arg(long = "population_multiplier")]
    pub population_multiplier: Option<u32>,

    #[arg(long = "n_subjs")]
    pub n_subjs: Option<u32>,
    #[arg(long = "n_conds")]
    pub n_conds: Option<u32>,
    #[arg(long = "n_trials")]
    pub n_trials: Option<u32>,
    /// Trial length in ms
    #[arg(long = "trial_len")]
    pub trial_len: Option<usize>,
    /// Divergence point in ms
    #[arg(long = "dpoint", allow_hyphen_values = true)]
    pub dpoint: Option<i64>,
    /// Divergence delay added per condition index, in ms
    #[arg(long = "cond_effect", allow_hyphen_values = true)]
    pub cond_effect: Option<i64>,
    /// Larger values make the post-divergence rise slower
    #[arg(long = "dspeed_slow_factor", allow_hyphen_values = true)]
    pub dspeed_slow_factor: Option<f64>,
    /// Probability of looking away at each fixation
    #[arg(long = "outmonitor_look_prob")]
    pub outmonitor_look_prob: Option<f64>,

    #[arg(long = "rand_dp_noise_sd")]
    pub rand_dp_noise_sd: Option<f64>,
    #[arg(long = "rand_prob_noise_sd")]
    pub rand_prob_noise_sd: Option<f64>,
    #[arg(long = "rand_dspeed_noise_sd")]
    pub rand_dspeed_noise_sd: Option<f64>,

    #[arg(long = "subj_per_trial_dpoint_var_sd")]
    pub subj_per_trial_dpoint_var_sd: Option<f64>,
    #[arg(long = "subj_per_trial_bias_var_sd")]
    pub subj_per_trial_bias_var_sd: Option<f64>,
    #[arg(long = "subj_per_trial_dspeed_var_sd")]
    pub subj_per_trial_dspeed_var_sd: Option<f64>,

    #[arg(long = "subj_dpoint_rand_intercept_sd")]
    pub subj_dpoint_rand_intercept_sd: Option<f64>,
    #[arg(long = "subj_dpoint_rand_slope_sd")]
    pub subj_dpoint_rand_slope_sd: Option<f64>,
    #[arg(long = "subj_bias_var_sd")]
    pub subj_bias_var_sd: Option<f64>,
    #[arg(long = "subj_dspeed_bias_var_sd")]
    pub subj_dspeed_bias_var_sd: Option<f64>,
    #[arg(long = "subj_outmonitor_look_bias_sd")]
    pub subj_outmonitor_look_bias_sd: Option<f64>,

    #[arg(long = "item_dpoint_bias_sd")]
    pub item_dpoint_bias_sd: Option<f64>,
    #[arg(long = "item_prob_bias_sd")]
    pub item_prob_bias_sd: Option<f64>,
    #[arg(long = "item_dspeed_bias_sd")]
    pub item_dspeed_bias_sd: Option<f64>,

    /// Write per_trial_fixation_stats.csv into --stats_dir
    #[arg(long = "dump_per_trial_fixation_stats")]
    pub dump_per_trial_fixation_stats: bool,

    /// Write the overall fixation summary and histogram into --stats_dir
    #[arg(long = "dump_overall_fixation_stats")]
    pub dump_overall_fixation_stats: bool,

    #[arg(long = "stats_dir", default_value = "fixation_stats")]
    pub stats_dir: PathBuf,

    /// Sweep TOML; generates one dataset per parameter combination
    #[arg(long)]
    pub sweep: Option<PathBuf>,

    /// Worker threads for sweeps
    #[arg(long, default_value_t = default_workers())]
    pub workers: usize,

    /// Log filter (e.g. `debug`, `dpa_fakegen=trace`); defaults to RUST_LOG or `info`
    #[arg(long = "log_level")]
    pub log_level: Option<String>,
}

impl Args {
    /// Numeric overrides given on the command line, by flat parameter name.
    pub fn overrides(&self) -> Vec<(&'static str, f64)> {
        let ints = [
            ("n_subjs", self.n_subjs.map(f64::from)),
            ("n_conds", self.n_conds.map(f64::from)),
            ("n_trials", self.n_trials.map(f64::from)),
            ("trial_len", self.trial_len.map(|v| v as f64)),
            ("dpoint", self.dpoint.map(|v| v as f64)),
            ("cond_effect", self.cond_effect.map(|v| v as f64)),
            (
                "population_multiplier",
                self.population_multiplier.map(f64::from),
            ),
        ];
        let floats = [
            ("dspeed_slow_factor", self.dspeed_slow_factor),
            ("outmonitor_look_prob", self.outmonitor_look_prob),
            ("rand_dp_noise_sd", self.rand_dp_noise_sd),
            ("rand_prob_noise_sd", self.rand_prob_noise_sd),
            ("rand_dspeed_noise_sd", self.rand_dspeed_noise_sd),
            ("subj_per_trial_dpoint_var_sd", self.subj_per_trial_dpoint_var_sd),
            ("subj_per_trial_bias_var_sd", self.subj_per_trial_bias_var_sd),
            ("subj_per_trial_dspeed_var_sd", self.subj_per_trial_dspeed_var_sd),
            ("subj_dpoint_rand_intercept_sd", self.subj_dpoint_rand_intercept_sd),
            ("subj_dpoint_rand_slope_sd", self.subj_dpoint_rand_slope_sd),
            ("subj_bias_var_sd", self.subj_bias_var_sd),
            ("subj_dspeed_bias_var_sd", self.subj_dspeed_bias_var_sd),
            ("subj_outmonitor_look_bias_sd", self.subj_outmonitor_look_bias_sd),
            ("item_dpoint_bias_sd", self.item_dpoint_bias_sd),
            ("item_prob_bias_sd", self.item_prob_bias_sd),
            ("item_dspeed_bias_sd", self.item_dspeed_bias_sd),
        ];
        ints.into_iter()
            .chain(floats)
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }

    /// Apply every flag that was given on top of `cfg`.
    pub fn apply_to(&self, cfg: &mut GeneratorConfig) -> Result<(), ConfigError> {
        for (name, value) in self.overrides() {
            cfg.set_param(name, value)?;
        }
        if let Some(seed) = &self.rand_seed {
            cfg.rand_seed = Some(seed.clone());
        }
        if self.force_dpoint {
            cfg.correction.force_dpoint = true;
        }
        if let Some(memory_efficient) = self.force_dp_memory_efficient {
            cfg.correction.memory_efficient = memory_efficient;
            // the streaming flag alone also turns forcing on
            if memory_efficient {
                cfg.correction.force_dpoint = true;
            }
        }
        Ok(())
    }

    /// Base config file (or defaults) with the command line applied.
    pub fn resolve_config(&self) -> Result<GeneratorConfig, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => GeneratorConfig::load_or_default(path),
            None => GeneratorConfig::default(),
        };
        self.apply_to(&mut cfg)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn snake_case_flags_override_defaults() {
        let args = Args::try_parse_from([
            "dpa-fakegen",
            "--n_subjs",
            "5",
            "--dpoint",
            "-40",
            "--item_prob_bias_sd",
            "0",
            "--rand_seed",
            "abcd",
            "--force_dpoint",
        ])
        .unwrap();
        let cfg = args.resolve_config().unwrap();
        assert_eq!(cfg.dataset.n_subjs, 5);
        assert_eq!(cfg.dataset.dpoint, -40);
        assert_eq!(cfg.item.item_prob_bias_sd, 0.0);
        assert_eq!(cfg.rand_seed.as_deref(), Some("abcd"));
        assert!(cfg.correction.force_dpoint);
        assert_eq!(cfg.dataset.trial_len, 1000);
        assert_eq!(args.out_file, PathBuf::from("fake_data.csv"));
    }

    #[test]
    fn invalid_override_names_the_field() {
        let args = Args {
            subj_bias_var_sd: Some(-1.0),
            ..Args::default()
        };
        let err = args.resolve_config().unwrap_err();
        assert!(err.to_string().contains("subj_bias_var_sd"));
    }

    #[test]
    fn memory_efficient_flag_enables_forcing() {
        let args = Args::try_parse_from(["dpa-fakegen", "--force_dp_memory_efficient"]).unwrap();
        let cfg = args.resolve_config().unwrap();
        assert!(cfg.correction.force_dpoint);
        assert!(cfg.correction.memory_efficient);

        let args =
            Args::try_parse_from(["dpa-fakegen", "--force_dpoint", "--force_dp_memory_efficient", "false"])
                .unwrap();
        let cfg = args.resolve_config().unwrap();
        assert!(cfg.correction.force_dpoint);
        assert!(!cfg.correction.memory_efficient);
    }
}
