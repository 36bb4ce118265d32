use crate::app::DisplayRequest;
use anyhow::anyhow;
use crossbeam_channel::Receiver;
use scanblock_core::{InputSignal, MessageStyle, Screen};
use scanblock_experiment::{Presenter, PresenterError, RunConfig, SlideResponse};
use tracing::debug;
use winit::event_loop::EventLoopProxy;

/// Blocks until a participant key arrives.
///
/// The abort key yields [`SlideResponse::Abort`]. Trigger keys are skipped so
/// scanner pulses cannot page through slides. Any other key continues.
pub fn wait_for_key(
    keys: &Receiver<InputSignal>,
    config: &RunConfig,
) -> Result<SlideResponse, PresenterError> {
    loop {
        let signal = keys.recv().map_err(|_| PresenterError::Disconnected)?;
        if config.is_abort(&signal.key) {
            return Ok(SlideResponse::Abort);
        }
        if config.is_trigger(&signal.key) {
            debug!(key = %signal.key, "trigger ignored while waiting for a key");
            continue;
        }
        return Ok(SlideResponse::Continue);
    }
}

fn drain(keys: &Receiver<InputSignal>) {
    while keys.try_recv().is_ok() {}
}

/// Presenter that forwards screens to the window's event loop and waits for
/// the loop to report when each frame was shown.
pub struct WindowPresenter {
    proxy: EventLoopProxy<DisplayRequest>,
    replies: Receiver<Result<f64, String>>,
    keys: Receiver<InputSignal>,
    config: RunConfig,
}

impl WindowPresenter {
    pub fn new(
        proxy: EventLoopProxy<DisplayRequest>,
        replies: Receiver<Result<f64, String>>,
        keys: Receiver<InputSignal>,
        config: RunConfig,
    ) -> Self {
        Self {
            proxy,
            replies,
            keys,
            config,
        }
    }
}

impl Presenter for WindowPresenter {
    fn render(&mut self, screen: &Screen) -> Result<f64, PresenterError> {
        self.proxy
            .send_event(DisplayRequest::Draw(screen.clone()))
            .map_err(|_| PresenterError::Disconnected)?;
        match self.replies.recv() {
            Ok(Ok(shown)) => Ok(shown),
            Ok(Err(msg)) => Err(PresenterError::Render(anyhow!(msg))),
            Err(_) => Err(PresenterError::Disconnected),
        }
    }

    fn instruction_slide(&mut self, text: &str) -> Result<SlideResponse, PresenterError> {
        // presses made before the slide appeared do not count
        drain(&self.keys);
        self.render(&Screen::message(text, MessageStyle::Instruction))?;
        wait_for_key(&self.keys, &self.config)
    }

    fn finish(&mut self, message: &str) -> Result<(), PresenterError> {
        self.render(&Screen::message(message, MessageStyle::Finished))?;
        if !self.config.fullscreen {
            drain(&self.keys);
            wait_for_key(&self.keys, &self.config)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn triggers_do_not_dismiss_a_slide() {
        let (tx, rx) = unbounded();
        tx.send(InputSignal::new("equal", 1.0)).unwrap();
        tx.send(InputSignal::new("space", 1.5)).unwrap();
        let config = RunConfig::default();
        assert_eq!(wait_for_key(&rx, &config).unwrap(), SlideResponse::Continue);
        assert!(rx.is_empty());
    }

    #[test]
    fn abort_key_aborts() {
        let (tx, rx) = unbounded();
        tx.send(InputSignal::new("Escape", 0.2)).unwrap();
        assert_eq!(
            wait_for_key(&rx, &RunConfig::default()).unwrap(),
            SlideResponse::Abort
        );
    }

    #[test]
    fn closed_input_is_a_disconnect() {
        let (tx, rx) = unbounded::<InputSignal>();
        drop(tx);
        assert!(matches!(
            wait_for_key(&rx, &RunConfig::default()),
            Err(PresenterError::Disconnected)
        ));
    }

    #[test]
    fn drain_discards_stale_presses() {
        let (tx, rx) = unbounded();
        for i in 0..3 {
            tx.send(InputSignal::new("space", i as f64)).unwrap();
        }
        drain(&rx);
        assert!(rx.is_empty());
    }
}
