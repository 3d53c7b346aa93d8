//! Files written by a generator run: the gaze table and fixation statistics.
//!
//! Every file goes to a hidden temporary sibling first and is renamed into
//! place, so an interrupted run leaves no partial file under a final name.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::sim::dataset::Dataset;
use crate::sim::stats::{self, FixationLog, OverallFixationStats, TrialFixationStats};

pub const PER_TRIAL_STATS_FILE: &str = "per_trial_fixation_stats.csv";
pub const OVERALL_STATS_FILE: &str = "overall_fixation_stats.txt";
pub const HISTOGRAM_FILE: &str = "histogram_fixation.svg";
const HISTOGRAM_BINS: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to render {path}: {message}")]
    Plot { path: PathBuf, message: String },
    #[error("no fixations were recorded")]
    NoFixations,
}

impl OutputError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

fn ensure_parent(path: &Path) -> Result<(), OutputError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|err| OutputError::io(dir, err))
        }
        _ => Ok(()),
    }
}

/// Write through `fill` into a temporary file, then rename it to `path`.
pub fn write_atomically<F>(path: &Path, fill: F) -> Result<(), OutputError>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    ensure_parent(path)?;
    let tmp = temp_sibling(path);
    let result = File::create(&tmp).and_then(|file| {
        let mut writer = BufWriter::new(file);
        fill(&mut writer)?;
        writer.flush()
    });
    if let Err(err) = result {
        let _ = fs::remove_file(&tmp);
        return Err(OutputError::io(path, err));
    }
    fs::rename(&tmp, path).map_err(|err| OutputError::io(path, err))
}

/// Long-format table with a leading row index column.
pub fn write_dataset<W: Write>(out: &mut W, dataset: &Dataset) -> io::Result<()> {
    writeln!(out, ",participant,condition,trial,time,object,is_looking")?;
    for (idx, row) in dataset.rows.iter().enumerate() {
        writeln!(
            out,
            "{idx},P{},{},T{},{},{},{}",
            row.participant, row.condition, row.trial, row.time, row.object, row.is_looking
        )?;
    }
    Ok(())
}

pub fn write_dataset_csv(path: &Path, dataset: &Dataset) -> Result<(), OutputError> {
    write_atomically(path, |w| write_dataset(w, dataset))
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn push_stats_row(csv: &mut String, idx: usize, row: &TrialFixationStats) {
    csv.push_str(&format!(
        "{idx},{},{},{},{},{},{}\n",
        row.max,
        row.min,
        row.mean,
        row.median,
        cell(row.mean_nolast),
        cell(row.median_nolast)
    ));
}

/// One row per trial followed by the column means.
pub fn per_trial_stats_csv(log: &FixationLog) -> String {
    let rows = stats::per_trial_stats(log);
    let mut csv = String::from(",Max,Min,Mean,Median,Mean_nolast,Median_nolast\n");
    for (idx, row) in rows.iter().enumerate() {
        push_stats_row(&mut csv, idx, row);
    }
    if let Some(agg) = stats::aggregate_row(&rows) {
        push_stats_row(&mut csv, rows.len(), &agg);
    }
    csv
}

pub fn write_per_trial_stats(path: &Path, log: &FixationLog) -> Result<(), OutputError> {
    let csv = per_trial_stats_csv(log);
    write_atomically(path, |w| w.write_all(csv.as_bytes()))
}

pub fn overall_stats_text(s: &OverallFixationStats) -> String {
    format!(
        "max, min, mean, median, sd\n{}, {}, {}, {}, {}",
        s.max,
        s.min,
        s.mean,
        s.median,
        cell(s.sd)
    )
}

pub fn histogram_counts(values: &[f64], min: f64, max: f64, bins: usize) -> Vec<(f64, usize)> {
    if bins == 0 || values.is_empty() {
        return Vec::new();
    }
    let width = ((max - min) / bins as f64).max(f64::MIN_POSITIVE);
    let mut counts = vec![0usize; bins];
    for &value in values {
        if value < min || value > max {
            continue;
        }
        let idx = (((value - min) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| (min + i as f64 * width, count))
        .collect()
}

pub fn render_fixation_histogram(path: &Path, lengths: &[f64]) -> Result<(), OutputError> {
    ensure_parent(path)?;
    let min = lengths.iter().copied().fold(f64::INFINITY, f64::min);
    let max = lengths.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() {
        return Err(OutputError::NoFixations);
    }
    let max = if max > min { max } else { min + 1.0 };
    let counts = histogram_counts(lengths, min, max, HISTOGRAM_BINS);
    let width = (max - min) / HISTOGRAM_BINS as f64;
    let y_max = counts.iter().map(|&(_, c)| c).max().unwrap_or(1).max(1) as f64;

    render_atomically(path, |tmp| draw_histogram(tmp, &counts, min..max, width, y_max))
}

/// Like [`write_atomically`] for backends that open the file themselves:
/// `draw` renders into the temporary path it is given.
fn render_atomically<F>(path: &Path, draw: F) -> Result<(), OutputError>
where
    F: FnOnce(&Path) -> Result<(), String>,
{
    let tmp = temp_sibling(path);
    if let Err(message) = draw(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(OutputError::Plot {
            path: path.to_path_buf(),
            message,
        });
    }
    fs::rename(&tmp, path).map_err(|err| OutputError::io(path, err))
}

fn draw_histogram(
    target: &Path,
    counts: &[(f64, usize)],
    x_range: std::ops::Range<f64>,
    width: f64,
    y_max: f64,
) -> Result<(), String> {
    let plot_err = |err: &dyn std::fmt::Display| err.to_string();
    let root = SVGBackend::new(target, (900, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_err(&e))?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Fixation lengths", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, 0.0..(y_max * 1.1))
        .map_err(|e| plot_err(&e))?;
    chart
        .configure_mesh()
        .x_desc("ms")
        .y_desc("count")
        .draw()
        .map_err(|e| plot_err(&e))?;
    chart
        .draw_series(counts.iter().map(|&(x0, count)| {
            Rectangle::new([(x0, 0.0), (x0 + width, count as f64)], BLUE.mix(0.4).filled())
        }))
        .map_err(|e| plot_err(&e))?;
    chart
        .draw_series(counts.iter().map(|&(x0, count)| {
            Rectangle::new([(x0, 0.0), (x0 + width, count as f64)], BLACK.stroke_width(1))
        }))
        .map_err(|e| plot_err(&e))?;
    root.present().map_err(|e| plot_err(&e))
}

/// Write the overall summary and its histogram into `dir`.
pub fn write_overall_stats(dir: &Path, log: &FixationLog) -> Result<(), OutputError> {
    let summary = stats::overall_stats(log).ok_or(OutputError::NoFixations)?;
    let text = overall_stats_text(&summary);
    write_atomically(&dir.join(OVERALL_STATS_FILE), |w| {
        w.write_all(text.as_bytes())
    })?;
    let lengths: Vec<f64> = log.all_lengths().map(|l| l as f64).collect();
    render_fixation_histogram(&dir.join(HISTOGRAM_FILE), &lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::dataset::TrialRecord;
    use crate::sim::fixation::GazeState;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dpa_fakegen_output_{tag}_{}", std::process::id()))
    }

    #[test]
    fn dataset_csv_has_index_and_labels() {
        let mut ds = Dataset::new(2);
        TrialRecord {
            participant: 4,
            condition: 1,
            trial: 9,
            gaze: vec![GazeState::Distractor, GazeState::Away],
        }
        .push_rows(&mut ds.rows, 0, 2);
        let mut buf = Vec::new();
        write_dataset(&mut buf, &ds).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ",participant,condition,trial,time,object,is_looking");
        assert_eq!(lines[1], "0,P4,1,T9,0,Target,0");
        assert_eq!(lines[2], "1,P4,1,T9,0,Distractor,1");
        assert_eq!(lines[4], "3,P4,1,T9,1,Distractor,0");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn per_trial_csv_leaves_nolast_blank_for_single_fixation() {
        let mut log = FixationLog::default();
        log.push_trial(vec![100, 300]);
        log.push_trial(vec![200]);
        let csv = per_trial_stats_csv(&log);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], ",Max,Min,Mean,Median,Mean_nolast,Median_nolast");
        assert_eq!(lines[1], "0,300,100,200,200,100,100");
        assert_eq!(lines[2], "1,200,200,200,200,,");
        assert_eq!(lines[3], "2,250,150,200,200,100,100");
    }

    #[test]
    fn histogram_counts_every_value_once() {
        let values = [1.0, 2.0, 2.5, 9.9, 10.0];
        let counts = histogram_counts(&values, 1.0, 10.0, 3);
        assert_eq!(counts.len(), 3);
        assert_eq!(counts.iter().map(|&(_, c)| c).sum::<usize>(), values.len());
        assert_eq!(counts[0].1, 3);
        assert_eq!(counts[2].1, 2);
    }

    #[test]
    fn atomic_write_replaces_file_and_cleans_up() {
        let dir = scratch_dir("atomic");
        let path = dir.join("data.csv");
        write_atomically(&path, |w| w.write_all(b"first")).unwrap();
        write_atomically(&path, |w| w.write_all(b"second")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!temp_sibling(&path).exists());

        let failed = write_atomically(&path, |_| Err(io::Error::other("boom")));
        assert!(failed.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!temp_sibling(&path).exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_render_removes_partial_file() {
        let dir = scratch_dir("render_fail");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(HISTOGRAM_FILE);
        let result = render_atomically(&path, |tmp| {
            fs::write(tmp, "<svg").map_err(|e| e.to_string())?;
            Err("backend gave up".to_string())
        });
        match result {
            Err(OutputError::Plot { message, .. }) => assert_eq!(message, "backend gave up"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!temp_sibling(&path).exists());
        assert!(!path.exists());

        render_atomically(&path, |tmp| fs::write(tmp, "<svg/>").map_err(|e| e.to_string()))
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<svg/>");
        assert!(!temp_sibling(&path).exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn overall_stats_files_are_written() {
        let dir = scratch_dir("overall");
        let mut log = FixationLog::default();
        log.push_trial(vec![180, 200, 240]);
        log.push_trial(vec![210, 230]);
        write_overall_stats(&dir, &log).unwrap();
        let text = fs::read_to_string(dir.join(OVERALL_STATS_FILE)).unwrap();
        assert!(text.starts_with("max, min, mean, median, sd\n240, 180, 212, 210, "));
        let svg = fs::read_to_string(dir.join(HISTOGRAM_FILE)).unwrap();
        assert!(svg.contains("<svg"));
        let _ = fs::remove_dir_all(&dir);
        assert!(matches!(
            write_overall_stats(&dir, &FixationLog::default()),
            Err(OutputError::NoFixations)
        ));
    }
}
