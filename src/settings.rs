use crate::cli::Cli;
use anyhow::{Context, Result};
use scanblock_core::BlockSpec;
use scanblock_experiment::{RunConfig, Task};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of a `--config` TOML file. Everything is optional; absent keys
/// keep the task preset's value.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    pub subjid: Option<String>,
    pub task: Option<Task>,
    pub trial_count: Option<usize>,
    pub triggers_per_block: Option<u32>,
    /// Labels resolved against the task preset.
    pub block_order: Option<Vec<String>>,
    /// Full block definitions; wins over `block_order`.
    pub blocks: Option<Vec<BlockSpec>>,
    pub trigger_keys: Option<Vec<String>>,
    pub abort_key: Option<String>,
    pub annotate: Option<bool>,
    pub show_instructions: Option<bool>,
    pub instructions: Option<Vec<String>>,
    pub fullscreen: Option<bool>,
    pub logging_enabled: Option<bool>,
    pub waiting_message: Option<String>,
    pub finish_message: Option<String>,
    pub flicker_period_secs: Option<f64>,
    pub poll_interval_ms: Option<u64>,
    pub wait_for_last_volume: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub font: Option<PathBuf>,
    pub simulate_tr: Option<f64>,
    pub simulate_jitter_ms: Option<f64>,
}

impl FileSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simulation {
    pub tr_secs: f64,
    pub jitter_ms: f64,
}

/// Everything the binary needs to start a run
#[derive(Debug, Clone)]
pub struct Settings {
    pub run: RunConfig,
    pub subjid: String,
    pub output_dir: PathBuf,
    pub font: Option<PathBuf>,
    pub headless: bool,
    pub simulate: Option<Simulation>,
}

impl Settings {
    /// Task preset, then the config file, then command-line flags.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileSettings::load(path)?,
            None => FileSettings::default(),
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: &Cli, file: FileSettings) -> Result<Self> {
        let task = cli.task.or(file.task).unwrap_or_default();
        let mut run = RunConfig::for_task(task);

        if let Some(n) = cli.trial_count.or(file.trial_count) {
            run.trial_count = n;
        }
        if let Some(n) = cli.triggers_per_block.or(file.triggers_per_block) {
            run.triggers_per_block = n;
        }

        if let Some(labels) = &cli.block_order {
            run.block_order = labels.iter().map(|l| task.block_for(l)).collect();
        } else if let Some(blocks) = file.blocks {
            run.block_order = blocks;
        } else if let Some(labels) = &file.block_order {
            run.block_order = labels.iter().map(|l| task.block_for(l)).collect();
        }

        if !cli.trigger_keys.is_empty() {
            run.trigger_keys = cli.trigger_keys.clone();
        } else if let Some(keys) = file.trigger_keys {
            run.trigger_keys = keys;
        }
        if let Some(key) = cli.abort_key.clone().or(file.abort_key) {
            run.abort_key = key;
        }

        run.annotate = cli.annotate || file.annotate.unwrap_or(run.annotate);
        run.show_instructions =
            !cli.no_instructions && file.show_instructions.unwrap_or(run.show_instructions);
        run.fullscreen = !cli.windowed && file.fullscreen.unwrap_or(run.fullscreen);
        run.logging_enabled = !cli.no_logging && file.logging_enabled.unwrap_or(run.logging_enabled);

        // slides mention the trial count, so regenerate them after it is known
        run.instructions = file
            .instructions
            .unwrap_or_else(|| task.instructions(run.trial_count));
        if let Some(msg) = file.waiting_message {
            run.waiting_message = msg;
        }
        if let Some(msg) = file.finish_message {
            run.finish_message = msg;
        }
        if let Some(secs) = file.flicker_period_secs {
            run.flicker_period_secs = secs;
        }
        if let Some(ms) = file.poll_interval_ms {
            run.poll_interval_ms = ms;
        }
        if let Some(wait) = file.wait_for_last_volume {
            run.wait_for_last_volume = wait;
        }

        run.validate().context("invalid run settings")?;

        let simulate = cli.simulate_tr.or(file.simulate_tr).map(|tr_secs| Simulation {
            tr_secs,
            jitter_ms: cli
                .simulate_jitter_ms
                .or(file.simulate_jitter_ms)
                .unwrap_or(0.0),
        });
        if let Some(sim) = simulate {
            anyhow::ensure!(
                sim.tr_secs > 0.0,
                "simulated TR must be positive, got {}",
                sim.tr_secs
            );
            anyhow::ensure!(
                sim.jitter_ms >= 0.0 && sim.jitter_ms < sim.tr_secs * 1000.0,
                "simulated jitter must be in [0, TR), got {} ms",
                sim.jitter_ms
            );
        }

        Ok(Self {
            run,
            subjid: cli
                .subjid
                .clone()
                .or(file.subjid)
                .unwrap_or_else(|| "XYZ".to_string()),
            output_dir: cli
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            font: cli.font.clone().or(file.font),
            headless: cli.headless,
            simulate,
        })
    }
}
