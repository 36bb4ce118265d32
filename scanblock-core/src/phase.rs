use serde::{Deserialize, Serialize};

/// Lifecycle of one scanner run
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunPhase {
    /// Nothing is presented until the scanner sends its first pulse.
    #[default]
    AwaitingStart,
    InBlock,
    Complete,
}

impl RunPhase {
    pub fn next(&self) -> Option<Self> {
        use RunPhase::*;
        Some(match self {
            AwaitingStart => InBlock,
            InBlock => Complete,
            Complete => return None,
        })
    }

    /// Only a running block tallies pulses.
    pub fn counts_triggers(&self) -> bool {
        matches!(self, Self::InBlock)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}
