use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use dpa_fakegen::config::GeneratorConfig;
use dpa_fakegen::sweep::{SweepSpec, run_sweep};

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "dpa_fakegen_sweep_{tag}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn base() -> GeneratorConfig {
    let mut cfg = GeneratorConfig::default();
    cfg.dataset.n_subjs = 2;
    cfg.dataset.n_conds = 1;
    cfg.dataset.n_trials = 2;
    cfg.dataset.trial_len = 50;
    cfg
}

fn spec(dir: PathBuf) -> SweepSpec {
    let mut params = BTreeMap::new();
    params.insert("dpoint".to_string(), vec![10.0, 20.0]);
    SweepSpec {
        params,
        n_datasets_per_paramset: 2,
        out_folder: dir,
        out_file: "fd".to_string(),
    }
}

#[test]
fn sweep_writes_one_file_per_dataset() {
    let dir = scratch_dir("all");
    let s = spec(dir.clone());
    let report = run_sweep(&s, &base(), 7, 3, Arc::new(AtomicBool::new(false))).unwrap();
    assert_eq!(report.total_written(), 4);
    assert!(report.failed.is_empty());
    assert_eq!(report.skipped, 0);

    let mut names: Vec<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 4);
    assert!(names.iter().all(|n| n.starts_with("fd_dpoint-") && n.ends_with(".csv")));
    assert_eq!(names.iter().filter(|n| n.starts_with("fd_dpoint-10_")).count(), 2);

    let text = fs::read_to_string(dir.join(&names[0])).unwrap();
    assert_eq!(text.lines().count(), 1 + 2 * 2 * 50 * 2);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn sweep_datasets_are_reproducible_from_the_top_seed() {
    let dir_a = scratch_dir("seed_a");
    let dir_b = scratch_dir("seed_b");
    run_sweep(&spec(dir_a.clone()), &base(), 99, 2, Arc::new(AtomicBool::new(false))).unwrap();
    run_sweep(&spec(dir_b.clone()), &base(), 99, 1, Arc::new(AtomicBool::new(false))).unwrap();
    let mut names: Vec<_> = fs::read_dir(&dir_a)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    names.sort();
    for name in names {
        let a = fs::read(dir_a.join(&name)).unwrap();
        let b = fs::read(dir_b.join(&name)).unwrap();
        assert_eq!(a, b);
    }
    let _ = fs::remove_dir_all(&dir_a);
    let _ = fs::remove_dir_all(&dir_b);
}

#[test]
fn stopped_sweep_skips_remaining_datasets() {
    let dir = scratch_dir("stopped");
    let report = run_sweep(&spec(dir.clone()), &base(), 7, 2, Arc::new(AtomicBool::new(true))).unwrap();
    assert_eq!(report.total_written(), 0);
    assert_eq!(report.skipped, 4);
    assert!(!dir.exists() || fs::read_dir(&dir).unwrap().next().is_none());
}

#[test]
fn undetectable_divergence_is_reported_as_uncorrected() {
    let dir = scratch_dir("uncorrected");
    let mut cfg = base();
    cfg.dataset.outmonitor_look_prob = 1.0;
    cfg.subject.subj_outmonitor_look_bias_sd = 0.0;
    cfg.correction.force_dpoint = true;
    let report = run_sweep(&spec(dir.clone()), &cfg, 7, 2, Arc::new(AtomicBool::new(false))).unwrap();
    assert!(report.written.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.uncorrected.len(), 4);
    assert_eq!(report.total_written(), 4);
    for path in &report.uncorrected {
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 1 + 2 * 2 * 50 * 2);
    }
    let _ = fs::remove_dir_all(&dir);
}
