#![allow(dead_code)]

use scanblock_core::{InputSignal, Screen};
use scanblock_experiment::{
    Listener, ListenerError, NotificationBus, Presenter, PresenterError, RunConfig, Scheduler,
    ScriptedSource, SlideResponse, Task,
};
use scanblock_timing::{FrameStats, Timer};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Test clock: only moves when something sleeps or a frame is drawn.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
    frames: Vec<Duration>,
}

impl ManualClock {
    pub fn advance(&self, secs: f64) {
        *self.now.lock().unwrap() += secs;
    }
}

impl Timer for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }

    fn elapsed(&self, since: f64) -> Duration {
        Duration::from_secs_f64((self.now() - since).max(0.0))
    }

    fn sleep(&self, d: Duration) {
        self.advance(d.as_secs_f64());
    }

    fn record_frame(&mut self, d: Duration) {
        self.frames.push(d);
    }

    fn frame_stats(&self) -> FrameStats {
        FrameStats {
            samples: self.frames.len(),
            ..FrameStats::default()
        }
    }
}

/// Shared, ordered trace of presenter draws and bus messages.
pub type Trace = Arc<Mutex<Vec<String>>>;

/// Draws nothing; each frame takes `frame_secs` on the manual clock.
pub struct RecordingPresenter {
    pub clock: ManualClock,
    pub frame_secs: f64,
    pub screens: Arc<Mutex<Vec<(Screen, f64)>>>,
    pub trace: Trace,
    pub slide_responses: Vec<SlideResponse>,
    pub slides: Arc<Mutex<Vec<String>>>,
    pub finished: Arc<Mutex<Option<String>>>,
    pub fail_on_frame: Option<usize>,
}

impl RecordingPresenter {
    pub fn new(clock: ManualClock, trace: Trace) -> Self {
        Self {
            clock,
            frame_secs: 0.016,
            screens: Arc::default(),
            trace,
            slide_responses: Vec::new(),
            slides: Arc::default(),
            finished: Arc::default(),
            fail_on_frame: None,
        }
    }
}

impl Presenter for RecordingPresenter {
    fn render(&mut self, screen: &Screen) -> Result<f64, PresenterError> {
        let mut screens = self.screens.lock().unwrap();
        if self.fail_on_frame == Some(screens.len()) {
            return Err(anyhow::anyhow!("swap chain lost").into());
        }
        self.clock.advance(self.frame_secs);
        let visible = self.clock.now();
        screens.push((screen.clone(), visible));
        if let Some(label) = screen.label() {
            self.trace.lock().unwrap().push(format!("draw:{label}"));
        }
        Ok(visible)
    }

    fn instruction_slide(&mut self, text: &str) -> Result<SlideResponse, PresenterError> {
        let mut slides = self.slides.lock().unwrap();
        slides.push(text.to_string());
        Ok(self
            .slide_responses
            .get(slides.len() - 1)
            .copied()
            .unwrap_or(SlideResponse::Continue))
    }

    fn finish(&mut self, message: &str) -> Result<(), PresenterError> {
        *self.finished.lock().unwrap() = Some(message.to_string());
        Ok(())
    }
}

/// Bus listener writing into the shared trace.
pub struct TraceListener(pub Trace);

impl Listener for TraceListener {
    fn name(&self) -> &str {
        "trace"
    }

    fn notify(&mut self, _stamp: f64, message: &str) -> Result<(), ListenerError> {
        self.0.lock().unwrap().push(format!("bus:{message}"));
        Ok(())
    }
}

pub fn config(task: Task, trials: usize, per_block: u32) -> RunConfig {
    let mut config = RunConfig::for_task(task);
    config.trial_count = trials;
    config.triggers_per_block = per_block;
    config.show_instructions = false;
    config.poll_interval_ms = 0;
    config
}

pub fn trig(at: f64) -> InputSignal {
    InputSignal::new("equal", at)
}

pub fn key(name: &str, at: f64) -> InputSignal {
    InputSignal::new(name, at)
}

/// `[start]`, then one pulse per poll every `tr` seconds.
pub fn steady_pulses(start: f64, tr: f64, after_start: usize) -> Vec<Vec<InputSignal>> {
    let mut batches = vec![vec![trig(start)]];
    batches.extend((1..=after_start).map(|i| vec![trig(start + tr * i as f64)]));
    batches
}

pub struct Harness {
    pub clock: ManualClock,
    pub trace: Trace,
    pub presenter: RecordingPresenter,
    pub bus: NotificationBus,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::default();
        let trace = Trace::default();
        let presenter = RecordingPresenter::new(clock.clone(), Arc::clone(&trace));
        let bus = NotificationBus::new().with_listener(TraceListener(Arc::clone(&trace)));
        Self {
            clock,
            trace,
            presenter,
            bus,
        }
    }

    pub fn scheduler(
        self,
        config: RunConfig,
        batches: Vec<Vec<InputSignal>>,
    ) -> Scheduler<ScriptedSource, RecordingPresenter, ManualClock> {
        Scheduler::new(
            config,
            ScriptedSource::new(batches),
            self.presenter,
            self.clock,
            self.bus,
        )
        .unwrap()
    }
}

pub fn bus_messages(trace: &Trace) -> Vec<String> {
    trace
        .lock()
        .unwrap()
        .iter()
        .filter_map(|l| l.strip_prefix("bus:").map(str::to_string))
        .collect()
}
