use scanblock_core::block::{RED, WHITE};
use scanblock_core::{BlockContent, BlockSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("trial count must be at least 1")]
    NoTrials,

    #[error("triggers per block must be at least 1")]
    NoTriggersPerBlock,

    #[error("block order is empty")]
    EmptyBlockOrder,

    #[error("block {index} in the block order has an empty label")]
    EmptyLabel { index: usize },

    #[error("no trigger keys configured")]
    NoTriggerKeys,

    #[error("abort key '{0}' is also a trigger key")]
    AbortIsTrigger(String),

    #[error("flicker period must be positive, got {0}")]
    FlickerPeriod(f64),
}

/// Task variants shipped with the binary. Each one fixes the block order,
/// what the blocks look like, and the instruction slides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Flickering checkerboard alternating with rest.
    #[default]
    Checkers,
    /// Hand grasp (make fists) alternating with rest.
    Grasp,
}

pub const REST_TEXT: &str = "Relax";
pub const GRASP_TEXT: &str = "Grasp";
pub const CHECKERS_LABEL: &str = "Grid";

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Checkers => "checkers",
            Task::Grasp => "grasp",
        }
    }

    pub fn block_order(&self) -> Vec<BlockSpec> {
        match self {
            Task::Checkers => vec![
                BlockSpec::new(CHECKERS_LABEL, BlockContent::checkerboard()),
                BlockSpec::text(REST_TEXT, WHITE),
            ],
            Task::Grasp => vec![
                BlockSpec::text(REST_TEXT, WHITE),
                BlockSpec::text(GRASP_TEXT, RED),
            ],
        }
    }

    /// Resolves a label given on the command line. Labels this task knows
    /// keep their preset look; anything else is shown as white text.
    pub fn block_for(&self, label: &str) -> BlockSpec {
        self.block_order()
            .into_iter()
            .find(|b| b.label.eq_ignore_ascii_case(label))
            .unwrap_or_else(|| BlockSpec::text(label, WHITE))
    }

    pub fn instructions(&self, trial_count: usize) -> Vec<String> {
        match self {
            Task::Checkers => vec!["This is the checkers task!".to_string()],
            Task::Grasp => vec![
                "This is the hand grasping task!".to_string(),
                format!(
                    "When the screen says '{GRASP_TEXT}',\n\
                     continually make a fist and release.\n\n\
                     It is important to continue to keep your head still,\n\
                     even when making a fist.\n\
                     We want to get good picture of your brain!"
                ),
                format!("When the screen says '{REST_TEXT}',\nrest your hand and stay still."),
                format!("We'll do this {trial_count} times."),
                "grasp = make many fists\nrelax = rest\n\nReady?!".to_string(),
            ],
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "checkers" | "checkerboard" => Ok(Task::Checkers),
            "grasp" => Ok(Task::Grasp),
            other => Err(format!("unknown task '{other}' (expected checkers or grasp)")),
        }
    }
}

/// Run parameters, frozen once the run starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub task: Task,
    /// Full repetitions of `block_order`.
    pub trial_count: usize,
    /// Pulses that make up one block.
    pub triggers_per_block: u32,
    pub block_order: Vec<BlockSpec>,
    pub trigger_keys: Vec<String>,
    pub abort_key: String,
    pub annotate: bool,
    pub show_instructions: bool,
    pub fullscreen: bool,
    pub logging_enabled: bool,
    pub instructions: Vec<String>,
    pub waiting_message: String,
    pub finish_message: String,
    pub flicker_period_secs: f64,
    /// Pause between control-loop iterations.
    pub poll_interval_ms: u64,
    /// Hold the last block for one more estimated TR so the final volume completes.
    pub wait_for_last_volume: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::for_task(Task::default())
    }
}

impl RunConfig {
    pub fn for_task(task: Task) -> Self {
        let trial_count = 1;
        Self {
            task,
            trial_count,
            triggers_per_block: 4,
            block_order: task.block_order(),
            trigger_keys: vec!["equal".to_string()],
            abort_key: "escape".to_string(),
            annotate: false,
            show_instructions: true,
            fullscreen: true,
            logging_enabled: true,
            instructions: task.instructions(trial_count),
            waiting_message: "Waiting for Scanner to start".to_string(),
            finish_message: "Done!\nThank you!".to_string(),
            flicker_period_secs: 0.1,
            poll_interval_ms: 1,
            wait_for_last_volume: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trial_count == 0 {
            return Err(ConfigError::NoTrials);
        }
        if self.triggers_per_block == 0 {
            return Err(ConfigError::NoTriggersPerBlock);
        }
        if self.block_order.is_empty() {
            return Err(ConfigError::EmptyBlockOrder);
        }
        if let Some(index) = self
            .block_order
            .iter()
            .position(|b| b.label.trim().is_empty())
        {
            return Err(ConfigError::EmptyLabel { index });
        }
        if self.trigger_keys.is_empty() {
            return Err(ConfigError::NoTriggerKeys);
        }
        if self.is_trigger(&self.abort_key) {
            return Err(ConfigError::AbortIsTrigger(self.abort_key.clone()));
        }
        if !(self.flicker_period_secs > 0.0) {
            return Err(ConfigError::FlickerPeriod(self.flicker_period_secs));
        }
        Ok(())
    }

    pub fn is_trigger(&self, key: &str) -> bool {
        self.trigger_keys.iter().any(|k| k.eq_ignore_ascii_case(key))
    }

    pub fn is_abort(&self, key: &str) -> bool {
        self.abort_key.eq_ignore_ascii_case(key)
    }

    /// Block shown at the given run-wide block index.
    pub fn block(&self, block_index: usize) -> &BlockSpec {
        &self.block_order[block_index % self.block_order.len()]
    }

    pub fn total_blocks(&self) -> usize {
        self.trial_count * self.block_order.len()
    }

    /// Pulses a complete run consumes, start pulse included.
    pub fn total_pulses(&self) -> u64 {
        self.total_blocks() as u64 * u64::from(self.triggers_per_block)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn flicker_period(&self) -> Duration {
        Duration::from_secs_f64(self.flicker_period_secs)
    }
}
