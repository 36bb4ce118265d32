use crate::config::RunConfig;
use crossbeam_channel::{Receiver, TryRecvError};
use scanblock_core::{InputSignal, TriggerEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriggerError {
    #[error("trigger input disconnected")]
    Disconnected,
}

/// Input channel strategy plugged into the poller at construction.
///
/// `poll` must return immediately with every signal that arrived since the
/// previous call. `wait` blocks until one signal arrives and leaves any others
/// queued for the next `poll`.
pub trait TriggerSource {
    fn poll(&mut self) -> Result<Vec<InputSignal>, TriggerError>;
    fn wait(&mut self) -> Result<InputSignal, TriggerError>;
}

/// Signals pushed by another thread (window event loop, simulated scanner).
pub struct ChannelSource {
    rx: Receiver<InputSignal>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<InputSignal>) -> Self {
        Self { rx }
    }
}

impl TriggerSource for ChannelSource {
    fn poll(&mut self) -> Result<Vec<InputSignal>, TriggerError> {
        let mut signals = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(signal) => signals.push(signal),
                Err(TryRecvError::Empty) => break,
                // hand over what arrived; the next poll reports the disconnect
                Err(TryRecvError::Disconnected) if !signals.is_empty() => break,
                Err(TryRecvError::Disconnected) => return Err(TriggerError::Disconnected),
            }
        }
        Ok(signals)
    }

    fn wait(&mut self) -> Result<InputSignal, TriggerError> {
        self.rx.recv().map_err(|_| TriggerError::Disconnected)
    }
}

/// Replays a fixed list of polls, one batch per `poll` call. Once the script
/// runs out the source reports a disconnect, so a run can never spin forever
/// on an exhausted script.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSource {
    batches: VecDeque<Vec<InputSignal>>,
}

impl ScriptedSource {
    pub fn new(batches: impl IntoIterator<Item = Vec<InputSignal>>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

impl TriggerSource for ScriptedSource {
    fn poll(&mut self) -> Result<Vec<InputSignal>, TriggerError> {
        self.batches.pop_front().ok_or(TriggerError::Disconnected)
    }

    fn wait(&mut self) -> Result<InputSignal, TriggerError> {
        while let Some(mut batch) = self.batches.pop_front() {
            if batch.is_empty() {
                continue;
            }
            let first = batch.remove(0);
            if !batch.is_empty() {
                self.batches.push_front(batch);
            }
            return Ok(first);
        }
        Err(TriggerError::Disconnected)
    }
}

/// What one poll saw
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Poll {
    /// Triggers in detection order. Triggers after an abort key are dropped.
    pub triggers: Vec<TriggerEvent>,
    pub abort: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FirstTrigger {
    Started(TriggerEvent),
    Aborted,
}

/// Sorts raw key presses into triggers and aborts, numbering triggers in
/// detection order.
pub struct TriggerPoller<S> {
    source: S,
    config: Arc<RunConfig>,
    next_sequence: u64,
}

impl<S: TriggerSource> TriggerPoller<S> {
    pub fn new(source: S, config: Arc<RunConfig>) -> Self {
        Self {
            source,
            config,
            next_sequence: 0,
        }
    }

    /// Blocks until the first trigger (or the abort key). Other keys are skipped.
    pub fn wait_for_first(&mut self) -> Result<FirstTrigger, TriggerError> {
        loop {
            let signal = self.source.wait()?;
            if self.config.is_abort(&signal.key) {
                return Ok(FirstTrigger::Aborted);
            }
            if self.config.is_trigger(&signal.key) {
                return Ok(FirstTrigger::Started(self.stamp(signal.at)));
            }
            debug!(key = %signal.key, "ignoring key while waiting for scanner");
        }
    }

    pub fn poll(&mut self) -> Result<Poll, TriggerError> {
        let mut poll = Poll::default();
        for signal in self.source.poll()? {
            if self.config.is_abort(&signal.key) {
                poll.abort = true;
                break;
            }
            if self.config.is_trigger(&signal.key) {
                let trigger = self.stamp(signal.at);
                poll.triggers.push(trigger);
            }
        }
        Ok(poll)
    }

    /// Triggers handed out so far, start pulse included. Pulses the block
    /// machine later ignores are counted here too.
    pub fn pulses_seen(&self) -> u64 {
        self.next_sequence
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn stamp(&mut self, at: f64) -> TriggerEvent {
        let trigger = TriggerEvent::new(at, self.next_sequence);
        self.next_sequence += 1;
        trigger
    }
}
