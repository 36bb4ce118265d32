use serde::{Deserialize, Serialize};

/// A key press as it reached software, stamped in seconds on the run clock.
///
/// The stamp is the detection time, not the time the scanner fired the pulse;
/// the gap is whatever latency the button box and OS input stack add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSignal {
    pub key: String,
    pub at: f64,
}

impl InputSignal {
    pub fn new(key: impl Into<String>, at: f64) -> Self {
        Self {
            key: key.into(),
            at,
        }
    }
}

/// A counted scanner pulse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub timestamp: f64,
    /// Run-wide pulse number. The start pulse is 0.
    pub sequence: u64,
    /// Pulses already credited to the block when this one arrived. Zero until
    /// the pulse is credited.
    pub sequence_in_block: u32,
}

impl TriggerEvent {
    pub fn new(timestamp: f64, sequence: u64) -> Self {
        Self {
            timestamp,
            sequence,
            sequence_in_block: 0,
        }
    }

    /// Copy of this pulse as credited at position `n` of its block.
    pub fn credited(self, n: u32) -> Self {
        Self {
            sequence_in_block: n,
            ..self
        }
    }
}

/// One row of the exported onset table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub onset: f64,
    pub event_name: String,
    pub onset0: f64,
}

impl EventRecord {
    pub fn new(onset: f64, event_name: impl Into<String>, start_time: f64) -> Self {
        Self {
            onset,
            event_name: event_name.into(),
            onset0: onset - start_time,
        }
    }
}

/// Two inter-pulse intervals, indexed by the parity of the pulse's position
/// within its block. Interleaved sequences
/// (e.g. VASO then BOLD) fire two pulses per repetition with different gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingEstimate {
    pub slots: [Option<f64>; 2],
}

impl TimingEstimate {
    pub fn slot(&self, parity: usize) -> Option<f64> {
        self.slots[parity % 2]
    }

    /// Value for display and file names; unset slots read as zero.
    pub fn seconds(&self, parity: usize) -> f64 {
        self.slot(parity).unwrap_or(0.0)
    }
}
