use anyhow::{Context, Result};
use scanblock_experiment::recorder::{output_stem, write_csv};
use scanblock_experiment::{FileListener, RunConfig, RunSummary};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Serialize)]
struct SavedRun<'a> {
    subjid: &'a str,
    config: &'a RunConfig,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// Files written for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Written {
    pub onsets: PathBuf,
    pub summary: PathBuf,
}

pub fn log_path(dir: &Path, subjid: &str, task: &str) -> PathBuf {
    dir.join(format!("{subjid}_{task}_log.txt"))
}

/// Opens the per-run status log, creating the output directory if needed.
pub fn open_log(dir: &Path, subjid: &str, task: &str) -> Result<FileListener> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = log_path(dir, subjid, task);
    FileListener::create(&path).with_context(|| format!("opening log {}", path.display()))
}

/// Writes the onset table and a JSON summary. The file stem carries the two
/// interval estimates.
pub fn write_run(dir: &Path, subjid: &str, config: &RunConfig, summary: &RunSummary) -> Result<Written> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let stem = output_stem(subjid, config.task.name(), &summary.estimate);

    let onsets = dir.join(format!("{stem}.csv"));
    let file = File::create(&onsets).with_context(|| format!("creating {}", onsets.display()))?;
    write_csv(&summary.records, BufWriter::new(file))
        .with_context(|| format!("writing {}", onsets.display()))?;

    let summary_path = dir.join(format!("{stem}.json"));
    let file = File::create(&summary_path)
        .with_context(|| format!("creating {}", summary_path.display()))?;
    let saved = SavedRun {
        subjid,
        config,
        summary,
    };
    serde_json::to_writer_pretty(BufWriter::new(file), &saved)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    info!(onsets = %onsets.display(), rows = summary.records.len(), "run saved");
    Ok(Written {
        onsets,
        summary: summary_path,
    })
}
