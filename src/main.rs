// Entry point: one dataset, or a parameter sweep on worker threads.
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dpa_fakegen::cli::Args;
use dpa_fakegen::config::GeneratorConfig;
use dpa_fakegen::output;
use dpa_fakegen::sim::{CorrectionOutcome, Generator};
use dpa_fakegen::sweep::{self, SweepSpec};

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_single(args: &Args, cfg: GeneratorConfig, seed: u64) -> Result<()> {
    let out = Generator::new(cfg, seed)?.run();
    if let CorrectionOutcome::NotFound(err) = out.correction {
        warn!("{err}; writing uncorrected data to {}", args.out_file.display());
    }
    output::write_dataset_csv(&args.out_file, &out.dataset)
        .with_context(|| format!("writing {}", args.out_file.display()))?;
    info!(rows = out.dataset.len(), path = %args.out_file.display(), "dataset written");

    if args.dump_per_trial_fixation_stats {
        let path = args.stats_dir.join(output::PER_TRIAL_STATS_FILE);
        output::write_per_trial_stats(&path, &out.fixations)
            .context("writing per-trial fixation stats")?;
        info!(path = %path.display(), "per-trial fixation stats written");
    }
    if args.dump_overall_fixation_stats {
        output::write_overall_stats(&args.stats_dir, &out.fixations)
            .context("writing overall fixation stats")?;
        info!(dir = %args.stats_dir.display(), "overall fixation stats written");
    }
    Ok(())
}

fn run_sweep(args: &Args, sweep_path: &Path, cfg: &GeneratorConfig, seed: u64) -> Result<()> {
    let spec = SweepSpec::load(sweep_path)
        .with_context(|| format!("loading sweep {}", sweep_path.display()))?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_for_ctrlc = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_for_ctrlc.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    let report = sweep::run_sweep(&spec, cfg, seed, args.workers, stop_flag)?;
    info!(
        written = report.written.len(),
        uncorrected = report.uncorrected.len(),
        failed = report.failed.len(),
        skipped = report.skipped,
        "sweep finished"
    );
    for path in &report.uncorrected {
        warn!(path = %path.display(), "divergence point not found; written uncorrected");
    }
    for (path, reason) in &report.failed {
        warn!(path = %path.display(), "{reason}");
    }
    if !report.failed.is_empty() {
        bail!("{} of the sweep datasets failed", report.failed.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let cfg = args.resolve_config().context("invalid configuration")?;
    let seed = cfg.resolve_seed();
    if cfg.rand_seed.is_none() {
        info!(seed, "no seed given; using a random one");
    }

    match &args.sweep {
        Some(sweep_path) => run_sweep(&args, sweep_path, &cfg, seed),
        None => run_single(&args, cfg, seed),
    }
}
