use anyhow::Context;
use scanblock_core::{MessageStyle, Screen};
use scanblock_experiment::{Presenter, PresenterError, SlideResponse};
use scanblock_render::{BlockRenderer, FontVec};
use scanblock_timing::Timer;
use std::time::Duration;
use tracing::debug;

pub const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Offscreen presenter for dry runs. Frames are rendered into memory and
/// paced to a fixed refresh interval so onsets look like a real display's.
pub struct HeadlessPresenter<T: Timer> {
    renderer: BlockRenderer,
    frame: Vec<u8>,
    timer: T,
    frame_interval: Duration,
    last_flip: Option<f64>,
    frames: u64,
}

impl<T: Timer> HeadlessPresenter<T> {
    pub fn new(
        width: u32,
        height: u32,
        font: Option<FontVec>,
        timer: T,
        frame_interval: Duration,
    ) -> anyhow::Result<Self> {
        let renderer = BlockRenderer::new(width, height, font).context("headless canvas")?;
        Ok(Self {
            renderer,
            frame: vec![0; width as usize * height as usize * 4],
            timer,
            frame_interval,
            last_flip: None,
            frames: 0,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Waits for the next refresh boundary, like a vsynced swap would.
    fn flip(&mut self) -> f64 {
        if let Some(last) = self.last_flip {
            let due = last + self.frame_interval.as_secs_f64();
            let wait = due - self.timer.now();
            if wait > 0.0 {
                self.timer.sleep(Duration::from_secs_f64(wait));
            }
        }
        let shown = self.timer.now();
        self.last_flip = Some(shown);
        self.frames += 1;
        shown
    }
}

impl<T: Timer> Presenter for HeadlessPresenter<T> {
    fn render(&mut self, screen: &Screen) -> Result<f64, PresenterError> {
        self.renderer.render_frame(screen, &mut self.frame)?;
        Ok(self.flip())
    }

    fn instruction_slide(&mut self, text: &str) -> Result<SlideResponse, PresenterError> {
        self.render(&Screen::message(text, MessageStyle::Instruction))?;
        debug!("headless: instruction slide skipped");
        Ok(SlideResponse::Continue)
    }

    fn finish(&mut self, message: &str) -> Result<(), PresenterError> {
        self.render(&Screen::message(message, MessageStyle::Finished))?;
        Ok(())
    }
}
