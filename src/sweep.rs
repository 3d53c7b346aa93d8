//! Parameter sweeps: one dataset per combination of swept values, generated
//! in parallel by worker threads that each own their generator.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, GeneratorConfig};
use crate::output;
use crate::sim::generator::{CorrectionOutcome, Generator};

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("empty value at position {position} in `{text}`")]
    EmptyItem { text: String, position: usize },
    #[error("`{0}` is not a finite number")]
    NotANumber(String),
    #[error("no values given for `{0}`")]
    EmptyList(String),
    #[error("`n_datasets_per_paramset` must be at least 1")]
    NoDatasets,
    #[error("failed to read sweep file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid sweep file: {0}")]
    Parse(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Strict comma-separated list of numbers. Whitespace around items is
/// ignored; empty items and anything that is not a finite number are errors.
pub fn parse_value_list(text: &str) -> Result<Vec<f64>, SweepError> {
    if text.trim().is_empty() {
        return Err(SweepError::EmptyList(text.to_string()));
    }
    text.split(',')
        .enumerate()
        .map(|(position, item)| {
            let item = item.trim();
            if item.is_empty() {
                return Err(SweepError::EmptyItem {
                    text: text.to_string(),
                    position,
                });
            }
            match item.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(SweepError::NotANumber(item.to_string())),
            }
        })
        .collect()
}

/// Values of one swept parameter as written in the sweep file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValues {
    List(Vec<f64>),
    Single(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawSweepSpec {
    #[serde(default = "SweepSpec::default_n_datasets_per_paramset")]
    n_datasets_per_paramset: u32,
    #[serde(default = "SweepSpec::default_out_folder")]
    out_folder: PathBuf,
    #[serde(default = "SweepSpec::default_out_file")]
    out_file: String,
    #[serde(default)]
    params: BTreeMap<String, RawValues>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    /// Candidate values per flat parameter name.
    pub params: BTreeMap<String, Vec<f64>>,
    pub n_datasets_per_paramset: u32,
    pub out_folder: PathBuf,
    /// File name prefix.
    pub out_file: String,
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self {
            params: BTreeMap::new(),
            n_datasets_per_paramset: Self::default_n_datasets_per_paramset(),
            out_folder: Self::default_out_folder(),
            out_file: Self::default_out_file(),
        }
    }
}

/// One dataset to generate.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepJob {
    pub index: usize,
    pub config: GeneratorConfig,
    pub seed: u64,
    pub path: PathBuf,
}

fn format_value(value: f64) -> String {
    format!("{value}")
}

impl SweepSpec {
    fn default_n_datasets_per_paramset() -> u32 {
        1
    }
    fn default_out_folder() -> PathBuf {
        PathBuf::from("out_datasets")
    }
    fn default_out_file() -> String {
        "fakedata".to_string()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SweepError> {
        let raw: RawSweepSpec =
            toml::from_str(text).map_err(|err| SweepError::Parse(err.to_string()))?;
        let mut params = BTreeMap::new();
        for (name, values) in raw.params {
            let values = match values {
                RawValues::List(v) => v,
                RawValues::Single(v) => vec![v],
                RawValues::Text(text) => parse_value_list(&text)?,
            };
            params.insert(name, values);
        }
        Ok(Self {
            params,
            n_datasets_per_paramset: raw.n_datasets_per_paramset,
            out_folder: raw.out_folder,
            out_file: raw.out_file,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let text = fs::read_to_string(path).map_err(|source| SweepError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Number of parameter combinations.
    pub fn combinations(&self) -> usize {
        self.params.values().map(Vec::len).product()
    }

    /// Cartesian product over `params` in sorted-name order, last name
    /// varying fastest. Each combination is applied to `base` and validated.
    pub fn expand(&self, base: &GeneratorConfig) -> Result<Vec<GeneratorConfig>, SweepError> {
        if let Some((name, _)) = self.params.iter().find(|(_, v)| v.is_empty()) {
            return Err(SweepError::EmptyList(name.clone()));
        }
        let entries: Vec<(&String, &Vec<f64>)> = self.params.iter().collect();
        let mut digits = vec![0usize; entries.len()];
        let mut out = Vec::with_capacity(self.combinations());
        loop {
            let mut cfg = base.clone();
            for (&(name, values), &d) in entries.iter().zip(&digits) {
                cfg.set_param(name, values[d])?;
            }
            cfg.validate()?;
            out.push(cfg);

            // odometer step
            let mut pos = entries.len();
            loop {
                if pos == 0 {
                    return Ok(out);
                }
                pos -= 1;
                digits[pos] += 1;
                if digits[pos] < entries[pos].1.len() {
                    break;
                }
                digits[pos] = 0;
            }
        }
    }

    fn file_name(&self, cfg: &GeneratorConfig, suffix: &str) -> String {
        let mut name = self.out_file.clone();
        for param in self.params.keys() {
            let value = cfg.param(param).unwrap_or(f64::NAN);
            name.push_str(&format!("_{param}-{}", format_value(value)));
        }
        name.push_str(&format!("_{suffix}.csv"));
        name
    }

    /// Jobs for every combination and repetition. Seeds and file suffixes come
    /// from one stream seeded with `top_seed`.
    pub fn plan(&self, base: &GeneratorConfig, top_seed: u64) -> Result<Vec<SweepJob>, SweepError> {
        if self.n_datasets_per_paramset == 0 {
            return Err(SweepError::NoDatasets);
        }
        let configs = self.expand(base)?;
        let mut rng = StdRng::seed_from_u64(top_seed);
        let mut jobs = Vec::new();
        for cfg in configs {
            for _ in 0..self.n_datasets_per_paramset {
                let seed: u64 = rng.random();
                let suffix = format!("{:08x}", rng.random::<u32>());
                let path = self.out_folder.join(self.file_name(&cfg, &suffix));
                let mut config = cfg.clone();
                config.rand_seed = Some(seed.to_string());
                jobs.push(SweepJob {
                    index: jobs.len(),
                    config,
                    seed,
                    path,
                });
            }
        }
        Ok(jobs)
    }
}

#[derive(Debug)]
pub enum JobResult {
    Written(PathBuf),
    /// Written without correction because no divergence was found.
    Uncorrected(PathBuf),
    Failed { path: PathBuf, reason: String },
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub written: Vec<PathBuf>,
    pub uncorrected: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    /// Jobs never started because the stop flag was set.
    pub skipped: usize,
}

impl SweepReport {
    pub fn total_written(&self) -> usize {
        self.written.len() + self.uncorrected.len()
    }

    fn record(&mut self, result: JobResult) {
        match result {
            JobResult::Written(path) => self.written.push(path),
            JobResult::Uncorrected(path) => self.uncorrected.push(path),
            JobResult::Failed { path, reason } => self.failed.push((path, reason)),
        }
    }
}

fn run_job(job: SweepJob) -> JobResult {
    let generator = match Generator::new(job.config, job.seed) {
        Ok(generator) => generator,
        Err(err) => {
            return JobResult::Failed {
                path: job.path,
                reason: err.to_string(),
            };
        }
    };
    let out = generator.run();
    if let Err(err) = output::write_dataset_csv(&job.path, &out.dataset) {
        return JobResult::Failed {
            path: job.path,
            reason: err.to_string(),
        };
    }
    match out.correction {
        CorrectionOutcome::NotFound(err) => {
            warn!(path = %job.path.display(), "{err}");
            JobResult::Uncorrected(job.path)
        }
        _ => JobResult::Written(job.path),
    }
}

fn worker_loop(
    jobs: Receiver<SweepJob>,
    results: Sender<JobResult>,
    stop: Arc<AtomicBool>,
    skipped: Sender<()>,
) {
    while let Ok(job) = jobs.recv() {
        if stop.load(Ordering::SeqCst) {
            let _ = skipped.send(());
            continue;
        }
        debug!(index = job.index, path = %job.path.display(), "dataset start");
        if results.send(run_job(job)).is_err() {
            break;
        }
    }
}

/// Run every planned job on `workers` threads. The stop flag is checked
/// before each dataset; a dataset already started is finished and written.
pub fn run_sweep(
    spec: &SweepSpec,
    base: &GeneratorConfig,
    top_seed: u64,
    workers: usize,
    stop: Arc<AtomicBool>,
) -> Result<SweepReport, SweepError> {
    let jobs = spec.plan(base, top_seed)?;
    let total = jobs.len();
    let workers = workers.clamp(1, total.max(1));
    info!(
        datasets = total,
        combinations = spec.combinations(),
        workers,
        out_folder = %spec.out_folder.display(),
        "starting sweep"
    );

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<SweepJob>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<JobResult>();
    let (skip_tx, skip_rx) = crossbeam_channel::unbounded::<()>();
    for job in jobs {
        // receiver is alive until the workers below exit
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let skipped = skip_tx.clone();
            let stop = stop.clone();
            thread::spawn(move || worker_loop(jobs, results, stop, skipped))
        })
        .collect();
    drop(result_tx);
    drop(skip_tx);

    let mut report = SweepReport::default();
    for result in result_rx.iter() {
        report.record(result);
        info!(
            done = report.total_written() + report.failed.len(),
            total, "dataset finished"
        );
    }
    for handle in handles {
        if handle.join().is_err() {
            warn!("sweep worker panicked");
        }
    }
    report.skipped = skip_rx.try_iter().count();
    if report.skipped > 0 {
        warn!(skipped = report.skipped, "sweep stopped early");
    }
    Ok(report)
}
