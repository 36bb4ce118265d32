use clap::Parser;
use scanblock_experiment::Task;
use std::path::PathBuf;

/// Trigger-locked block-design stimulus presentation for fMRI runs.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "scanblock", version, about)]
pub struct Cli {
    /// Subject id used to name the output files.
    #[arg(long)]
    pub subjid: Option<String>,

    /// Task preset: checkers or grasp.
    #[arg(long)]
    pub task: Option<Task>,

    /// Repetitions of the block order.
    #[arg(long = "ntrials", value_name = "N")]
    pub trial_count: Option<usize>,

    /// Scanner pulses per block.
    #[arg(long = "ntr", value_name = "N")]
    pub triggers_per_block: Option<u32>,

    /// Comma separated block labels, e.g. `Relax,Grasp`.
    #[arg(long, value_delimiter = ',', value_name = "LABELS")]
    pub block_order: Option<Vec<String>>,

    /// Overlay pulse count, block and interval estimates on every frame.
    #[arg(long)]
    pub annotate: bool,

    #[arg(long)]
    pub no_instructions: bool,

    /// Run in a window instead of fullscreen; the finish screen waits for a key.
    #[arg(long)]
    pub windowed: bool,

    /// Key that counts as a scanner pulse. Repeat for several.
    #[arg(long = "trigger-key", value_name = "KEY")]
    pub trigger_keys: Vec<String>,

    #[arg(long, value_name = "KEY")]
    pub abort_key: Option<String>,

    /// Do not write the onset table, summary or log file.
    #[arg(long)]
    pub no_logging: bool,

    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// TrueType font for text blocks and messages.
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Render offscreen; keys are read from stdin, one name per line.
    #[arg(long)]
    pub headless: bool,

    /// Emit simulated scanner pulses every SECS seconds.
    #[arg(long, value_name = "SECS")]
    pub simulate_tr: Option<f64>,

    /// Uniform jitter applied to each simulated pulse.
    #[arg(long, value_name = "MS")]
    pub simulate_jitter_ms: Option<f64>,

    /// TOML file with run settings; flags given here take precedence.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}
