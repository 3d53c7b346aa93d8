//! Dataset assembly: participants × conditions × trials in one seeded stream.
//!
//! Draw order per participant is fixed: participant effects, then for each
//! (condition, trial) the item effects on first encounter, the trial noise,
//! every fixation length, the initial look and the per-onset decisions.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use tracing::{debug, info, warn};

use super::correction::{self, CorrectionError, LookAccumulator};
use super::curve::{self, POSTTRIAL_BUFFER_MS, PRETRIAL_BUFFER_MS, ProbabilityCurve, TrialEffects};
use super::dataset::{Dataset, TrialRecord};
use super::effects::{ItemEffectCache, ItemKey, Ms, ParticipantEffects, TrialNoise};
use super::fixation::{self, Fixation, GazeState};
use super::sigmoid::Diagnostics;
use super::stats::FixationLog;
use crate::config::{ConfigError, GeneratorConfig};

/// Everything simulated for one trial.
#[derive(Clone, Debug)]
pub struct SimulatedTrial {
    pub curve: ProbabilityCurve,
    pub fixations: Vec<Fixation>,
    /// Gaze over the recorded window (pretrial buffer removed).
    pub gaze: Vec<GazeState>,
}

/// Result of divergence forcing for one run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CorrectionOutcome {
    Disabled,
    Applied { empirical: Ms, shift: Ms },
    /// The data was written uncorrected; only trimmed to the trial window.
    NotFound(CorrectionError),
}

#[derive(Clone, Debug)]
pub struct GeneratorOutput {
    pub dataset: Dataset,
    pub fixations: FixationLog,
    pub diagnostics: Diagnostics,
    pub correction: CorrectionOutcome,
    pub seed: u64,
}

impl GeneratorOutput {
    /// The corrected dataset, or the error when forcing was requested and failed.
    pub fn corrected(self) -> Result<Dataset, CorrectionError> {
        match self.correction {
            CorrectionOutcome::NotFound(err) => Err(err),
            _ => Ok(self.dataset),
        }
    }
}

pub struct Generator {
    cfg: GeneratorConfig,
    seed: u64,
    rng: StdRng,
    items: ItemEffectCache,
    diagnostics: Diagnostics,
    fixations: FixationLog,
}

impl Generator {
    /// Validates `cfg`; nothing is simulated for an invalid configuration.
    pub fn new(cfg: GeneratorConfig, seed: u64) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            seed,
            rng: StdRng::seed_from_u64(seed),
            items: ItemEffectCache::new(),
            diagnostics: Diagnostics::new(),
            fixations: FixationLog::default(),
        })
    }

    /// Uses the configured seed, or entropy when none is set.
    pub fn from_config(cfg: GeneratorConfig) -> Result<Self, ConfigError> {
        let seed = cfg.resolve_seed();
        Self::new(cfg, seed)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.cfg
    }

    pub fn items(&self) -> &ItemEffectCache {
        &self.items
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn fixation_log(&self) -> &FixationLog {
        &self.fixations
    }

    fn posttrial_buffer(&self) -> usize {
        if self.cfg.correction.force_dpoint {
            POSTTRIAL_BUFFER_MS
        } else {
            0
        }
    }

    /// Simulated milliseconds per trial, buffers included.
    pub fn simulated_len(&self) -> usize {
        PRETRIAL_BUFFER_MS + self.cfg.dataset.trial_len + self.posttrial_buffer()
    }

    pub fn draw_participant(&mut self) -> ParticipantEffects {
        ParticipantEffects::draw(&mut self.rng, &self.cfg)
    }

    pub fn simulate_trial(
        &mut self,
        subj: &ParticipantEffects,
        condition: u32,
        trial: u32,
    ) -> SimulatedTrial {
        let item = self
            .items
            .get_or_draw(ItemKey { condition, trial }, &mut self.rng, &self.cfg);
        let noise = TrialNoise::draw(&mut self.rng, &self.cfg, subj);
        let fx = TrialEffects {
            participant: subj,
            item: &item,
            noise: &noise,
        };
        let len = self.simulated_len();
        let curve = curve::build_curve(
            &self.cfg,
            PRETRIAL_BUFFER_MS,
            len,
            condition,
            &fx,
            &mut self.diagnostics,
        );
        let fixations: Vec<Fixation> = fixation::generate_fixations(&mut self.rng, len).collect();
        self.fixations
            .push_trial(fixations.iter().map(|f| f.length).collect());
        let mut gaze = fixation::sample_gaze(
            &mut self.rng,
            &curve.values,
            &fixations,
            subj.away_probability(&self.cfg),
        );
        gaze.drain(..PRETRIAL_BUFFER_MS.min(gaze.len()));
        SimulatedTrial {
            curve,
            fixations,
            gaze,
        }
    }

    /// Simulate every trial of `population` participants, passing each
    /// recorded trial to `sink` in (participant, condition, trial) order.
    fn simulate_population(&mut self, population: u32, mut sink: impl FnMut(TrialRecord)) {
        let (n_conds, n_trials) = (self.cfg.dataset.n_conds, self.cfg.dataset.n_trials);
        for participant in 0..population {
            let subj = self.draw_participant();
            debug!(participant, ?subj, "participant effects");
            for condition in 0..n_conds {
                for trial in 0..n_trials {
                    let sim = self.simulate_trial(&subj, condition, trial);
                    sink(TrialRecord {
                        participant,
                        condition,
                        trial,
                        gaze: sim.gaze,
                    });
                }
            }
        }
    }

    /// Ids to keep after correction, sorted. No draw is made when the whole
    /// population is kept.
    fn sample_participants(&mut self, population: u32) -> Option<Vec<u32>> {
        let wanted = self.cfg.dataset.n_subjs;
        if population <= wanted {
            return None;
        }
        let mut ids: Vec<u32> = index::sample(&mut self.rng, population as usize, wanted as usize)
            .into_iter()
            .map(|i| i as u32)
            .collect();
        ids.sort_unstable();
        Some(ids)
    }

    fn finish(self, dataset: Dataset, correction: CorrectionOutcome) -> GeneratorOutput {
        if self.diagnostics.degenerate_trials() > 0 {
            warn!(
                trials = self.diagnostics.degenerate_trials(),
                "trials used the fallback sigmoid"
            );
        }
        GeneratorOutput {
            dataset,
            fixations: self.fixations,
            diagnostics: self.diagnostics,
            correction,
            seed: self.seed,
        }
    }

    fn run_plain(mut self) -> GeneratorOutput {
        let trial_len = self.cfg.dataset.trial_len;
        let mut dataset = Dataset::new(trial_len);
        let population = self.cfg.dataset.n_subjs;
        self.simulate_population(population, |record| {
            record.push_rows(&mut dataset.rows, 0, trial_len)
        });
        self.finish(dataset, CorrectionOutcome::Disabled)
    }

    fn outcome(estimate: Result<Ms, CorrectionError>, target: Ms) -> (Ms, CorrectionOutcome) {
        match estimate {
            Ok(empirical) => {
                let shift = target - empirical;
                info!(empirical, target, shift, "divergence point forced");
                (shift, CorrectionOutcome::Applied { empirical, shift })
            }
            Err(err) => {
                warn!("{err}; keeping uncorrected data");
                (0, CorrectionOutcome::NotFound(err))
            }
        }
    }

    /// Full table first, then the same estimate/shift/trim as `correction::correct`.
    fn run_table_correction(mut self) -> GeneratorOutput {
        let trial_len = self.cfg.dataset.trial_len;
        let mut dataset = Dataset::new(trial_len);
        let population = self.cfg.population_size();
        self.simulate_population(population, |record| {
            let simulated = record.gaze.len();
            record.push_rows(&mut dataset.rows, 0, simulated)
        });
        let estimate = correction::estimate_divergence_point(&dataset);
        let (shift, outcome) = Self::outcome(estimate, self.cfg.dataset.dpoint);
        correction::shift_and_trim(&mut dataset, shift);
        if let Some(keep) = self.sample_participants(population) {
            dataset.retain_participants(&keep);
        }
        self.finish(dataset, outcome)
    }

    /// Compact gaze vectors plus condition-0 look counts; rows are built
    /// after the shift, for the sampled participants only.
    fn run_streaming_correction(mut self) -> GeneratorOutput {
        let trial_len = self.cfg.dataset.trial_len;
        let population = self.cfg.population_size();
        let mut records = Vec::new();
        let mut acc = LookAccumulator::new();
        self.simulate_population(population, |record| {
            if record.condition == 0 {
                for (ms, &state) in record.gaze.iter().enumerate() {
                    acc.add(
                        record.participant,
                        0,
                        ms as Ms,
                        state == GazeState::Target,
                    );
                }
            }
            records.push(record);
        });
        let (shift, outcome) =
            Self::outcome(acc.estimate_divergence_point(), self.cfg.dataset.dpoint);
        drop(acc);
        let keep = self.sample_participants(population);
        let mut dataset = Dataset::new(trial_len);
        for mut record in records {
            if let Some(keep) = &keep {
                match keep.binary_search(&record.participant) {
                    Ok(new_id) => record.participant = new_id as u32,
                    Err(_) => continue,
                }
            }
            record.push_rows(&mut dataset.rows, shift, trial_len);
        }
        self.finish(dataset, outcome)
    }

    /// Generate one dataset. Consumes the generator so its item cache and
    /// diagnostics never outlive the dataset they belong to.
    pub fn run(self) -> GeneratorOutput {
        let ds = &self.cfg.dataset;
        info!(
            seed = self.seed,
            n_subjs = ds.n_subjs,
            n_conds = ds.n_conds,
            n_trials = ds.n_trials,
            trial_len = ds.trial_len,
            "generating dataset"
        );
        let correction = self.cfg.correction;
        if !correction.force_dpoint {
            self.run_plain()
        } else if correction.memory_efficient {
            info!(
                population = self.cfg.population_size(),
                "forcing divergence point (streaming)"
            );
            self.run_streaming_correction()
        } else {
            info!(
                population = self.cfg.population_size(),
                "forcing divergence point"
            );
            self.run_table_correction()
        }
    }
}

/// Validate `cfg` and generate one dataset with its configured seed.
pub fn generate(cfg: &GeneratorConfig) -> Result<GeneratorOutput, ConfigError> {
    Ok(Generator::from_config(cfg.clone())?.run())
}
