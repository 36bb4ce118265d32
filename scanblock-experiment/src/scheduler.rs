use crate::bus::NotificationBus;
use crate::config::{ConfigError, RunConfig};
use crate::poller::{FirstTrigger, TriggerError, TriggerPoller, TriggerSource};
use crate::recorder::EventRecorder;
use crate::state::{BlockEvent, BlockStateMachine};
use scanblock_core::{EventRecord, MessageStyle, Screen, TimingEstimate};
use scanblock_timing::{FrameStats, Timer, TimingEstimator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PresenterError {
    #[error("display is no longer available")]
    Disconnected,

    #[error(transparent)]
    Render(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// A frame that cannot be drawn invalidates every onset after it.
    #[error("presenter failed: {0}")]
    Presenter(#[from] PresenterError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideResponse {
    Continue,
    Abort,
}

/// Capabilities a task variant supplies to the scheduler.
pub trait Presenter {
    /// Draws `screen` and returns the run-clock time at which the frame became
    /// visible (after the buffer swap), not the time the call was made.
    fn render(&mut self, screen: &Screen) -> Result<f64, PresenterError>;

    /// Shows one instruction slide and waits for the participant.
    fn instruction_slide(&mut self, text: &str) -> Result<SlideResponse, PresenterError>;

    fn finish(&mut self, message: &str) -> Result<(), PresenterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Aborted,
    AbortedBeforeStart,
}

/// Everything a run produced, handed back for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub run_start: Option<f64>,
    pub blocks_completed: usize,
    /// Pulses credited to blocks, start pulse included.
    pub pulses: u64,
    pub estimate: TimingEstimate,
    pub frame_stats: FrameStats,
    pub records: Vec<EventRecord>,
}

/// Trigger-locked block scheduler.
///
/// Single-threaded: this type owns the run state and is the only thing that
/// mutates it. Producers on other threads talk to it through the trigger
/// source; the presenter may forward draws elsewhere but answers synchronously.
pub struct Scheduler<S, P, T>
where
    S: TriggerSource,
    P: Presenter,
    T: Timer,
{
    config: Arc<RunConfig>,
    poller: TriggerPoller<S>,
    presenter: P,
    timer: T,
    bus: NotificationBus,
    machine: BlockStateMachine,
    recorder: EventRecorder,
    estimator: TimingEstimator,
    run_start: f64,
    flicker_phase: u64,
    last_flip: f64,
}

impl<S, P, T> Scheduler<S, P, T>
where
    S: TriggerSource,
    P: Presenter,
    T: Timer,
{
    pub fn new(
        config: RunConfig,
        source: S,
        presenter: P,
        timer: T,
        bus: NotificationBus,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            poller: TriggerPoller::new(source, Arc::clone(&config)),
            machine: BlockStateMachine::new(Arc::clone(&config)),
            config,
            presenter,
            timer,
            bus,
            recorder: EventRecorder::new(),
            estimator: TimingEstimator::new(0.0),
            run_start: 0.0,
            flicker_phase: 0,
            last_flip: 0.0,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs instructions, waits for the scanner, then presents blocks until
    /// the last one completes or the abort key is pressed.
    pub fn run(mut self) -> Result<RunSummary, SchedulerError> {
        if self.config.show_instructions {
            let config = Arc::clone(&self.config);
            for slide in &config.instructions {
                if self.presenter.instruction_slide(slide)? == SlideResponse::Abort {
                    self.announce(self.timer.now(), "ABORTED during instructions");
                    return Ok(self.into_summary(RunOutcome::AbortedBeforeStart));
                }
            }
        }

        let waiting = Screen::message(self.config.waiting_message.clone(), MessageStyle::Waiting);
        let shown = self.draw(&waiting)?;
        self.announce(shown, "Waiting for scanner");

        let start = match self.poller.wait_for_first()? {
            FirstTrigger::Started(trigger) => trigger,
            FirstTrigger::Aborted => {
                self.announce(self.timer.now(), "ABORTED while waiting for scanner");
                return Ok(self.into_summary(RunOutcome::AbortedBeforeStart));
            }
        };
        self.run_start = start.timestamp;
        self.estimator = TimingEstimator::new(start.timestamp);
        info!(start = start.timestamp, "run started");
        self.announce(
            start.timestamp,
            &format!("STARTING: received first TR pulse {:.4}", start.timestamp),
        );
        let events = self.machine.start(&start);
        self.dispatch(events)?;

        while !self.machine.phase().is_complete() {
            self.refresh()?;

            let poll = self.poller.poll()?;
            let events = self.machine.on_tick(&poll.triggers);
            self.dispatch(events)?;

            if poll.abort && !self.machine.phase().is_complete() {
                return Ok(self.abort());
            }
            self.timer.sleep(self.config.poll_interval());
        }

        self.wait_for_last_volume();
        self.presenter.finish(&self.config.finish_message)?;
        self.announce(self.timer.now(), "Done");
        Ok(self.into_summary(RunOutcome::Completed))
    }

    fn dispatch(&mut self, events: Vec<BlockEvent>) -> Result<(), SchedulerError> {
        for event in events {
            match event {
                BlockEvent::Started { at } => debug!(at, "start pulse consumed"),
                BlockEvent::Pulse {
                    trigger,
                    block_index,
                    triggers_in_block,
                } => {
                    // before any redraw, so a block entered by this pulse shows it
                    let interval = self.estimator.observe(&trigger);
                    debug!(
                        sequence = trigger.sequence,
                        in_block = trigger.sequence_in_block,
                        interval,
                        block_index,
                        triggers_in_block,
                        "pulse"
                    );
                    let msg = format!(
                        "pulse {:.3} ({:.4}) {}/{} block {}",
                        trigger.timestamp - self.run_start,
                        trigger.timestamp,
                        triggers_in_block,
                        self.config.triggers_per_block,
                        block_index,
                    );
                    self.announce(trigger.timestamp, &msg);
                }
                BlockEvent::BlockEntered {
                    block_index,
                    label,
                    previous,
                    triggers_in_block,
                } => {
                    self.recorder.commit();
                    self.flicker_phase = 0;

                    // draw, then record what the participant saw, then tell the bus
                    let screen = self.block_screen(block_index, triggers_in_block);
                    let visible = self.draw(&screen)?;
                    self.last_flip = visible;
                    self.recorder.begin(visible, &label, self.run_start);

                    let onset0 = visible - self.run_start;
                    let msg = match previous {
                        Some(prev) => format!("block {block_index}: {prev} -> {label} at {onset0:.3}"),
                        None => format!("block {block_index}: {label} at {onset0:.3}"),
                    };
                    info!(block_index, label = %label, onset0, "block onset");
                    self.announce(visible, &msg);
                }
                BlockEvent::Completed { blocks, last } => {
                    self.recorder.commit();
                    info!(blocks, "run complete");
                    self.announce(
                        self.timer.now(),
                        &format!("run complete after {blocks} blocks (last: {last})"),
                    );
                }
                BlockEvent::Ignored { trigger } => {
                    debug!(sequence = trigger.sequence, "pulse outside a block ignored")
                }
            }
        }
        Ok(())
    }

    /// Redraws the current block between transitions. Static blocks are
    /// redrawn every iteration, flickering ones once per flicker period.
    fn refresh(&mut self) -> Result<(), SchedulerError> {
        let Some(block) = self.machine.current_block() else {
            return Ok(());
        };
        let flickers = block.content.flickers();
        if flickers {
            if self.timer.elapsed(self.last_flip) < self.config.flicker_period() {
                return Ok(());
            }
            self.flicker_phase += 1;
        }

        let screen = self.block_screen(self.machine.block_index(), self.machine.triggers_in_block());
        let visible = self.draw(&screen)?;
        if flickers {
            self.last_flip = visible;
        }
        Ok(())
    }

    fn block_screen(&self, block_index: usize, triggers_in_block: u32) -> Screen {
        let block = self.config.block(block_index);
        let annotation = self.config.annotate.then(|| {
            let est = self.estimator.estimate();
            format!(
                "{}@{}={} {:.3} {:.3}",
                triggers_in_block,
                block_index,
                block.label,
                est.seconds(0),
                est.seconds(1)
            )
        });
        Screen::Block {
            label: block.label.clone(),
            content: block.content.clone(),
            flicker_phase: self.flicker_phase,
            annotation,
        }
    }

    fn draw(&mut self, screen: &Screen) -> Result<f64, SchedulerError> {
        let before = self.timer.now();
        let visible = self.presenter.render(screen)?;
        let took = self.timer.elapsed(before);
        self.timer.record_frame(took);
        Ok(visible)
    }

    fn announce(&mut self, stamp: f64, message: &str) {
        self.bus.publish(stamp, message);
    }

    /// Scanner keeps acquiring the volume started by the last pulse; hold the
    /// final block for one estimated TR before the finish screen.
    fn wait_for_last_volume(&mut self) {
        if !self.config.wait_for_last_volume {
            return;
        }
        if let Some(tr) = self.estimator.estimate().slot(1).filter(|tr| *tr > 0.0) {
            debug!(tr, "waiting for last volume");
            self.timer.sleep(Duration::from_secs_f64(tr));
        }
    }

    fn abort(mut self) -> RunSummary {
        let msg = match self.recorder.discard_pending() {
            Some(open) => format!(
                "ABORTED during {} (onset0 {:.3}); block not exported",
                open.event_name, open.onset0
            ),
            None => "ABORTED".to_string(),
        };
        warn!(blocks_completed = self.machine.block_index(), "run aborted");
        self.announce(self.timer.now(), &msg);
        self.into_summary(RunOutcome::Aborted)
    }

    fn into_summary(self, outcome: RunOutcome) -> RunSummary {
        debug!(
            detected = self.poller.pulses_seen(),
            credited = self.machine.pulses_credited(),
            "pulses"
        );
        RunSummary {
            outcome,
            run_start: self.machine.run_start(),
            blocks_completed: self.machine.block_index(),
            pulses: self.machine.pulses_credited(),
            estimate: self.estimator.estimate(),
            frame_stats: self.timer.frame_stats(),
            records: self.recorder.into_records(),
        }
    }
}
