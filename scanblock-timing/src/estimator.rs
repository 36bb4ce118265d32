use scanblock_core::{TimingEstimate, TriggerEvent};

/// Derives the two inter-pulse intervals from the first pulses of the run.
///
/// The slot is chosen by the parity of the pulse's position within its block,
/// so callers must hand in pulses after the block machine credited them.
/// Each parity slot keeps the first interval it sees; later intervals are
/// reported back to the caller but never overwrite it. Non-monotonic stamps
/// give negative intervals, which are kept as-is.
#[derive(Debug, Clone)]
pub struct TimingEstimator {
    last_timestamp: f64,
    estimate: TimingEstimate,
}

impl TimingEstimator {
    /// `start` is the time of the pulse that opened the run.
    pub fn new(start: f64) -> Self {
        Self {
            last_timestamp: start,
            estimate: TimingEstimate::default(),
        }
    }

    /// Returns the interval since the previous pulse.
    pub fn observe(&mut self, trigger: &TriggerEvent) -> f64 {
        let interval = trigger.timestamp - self.last_timestamp;
        let slot = &mut self.estimate.slots[(trigger.sequence_in_block % 2) as usize];
        if slot.is_none() {
            *slot = Some(interval);
        }
        self.last_timestamp = trigger.timestamp;
        interval
    }

    pub fn estimate(&self) -> TimingEstimate {
        self.estimate
    }

    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }
}
