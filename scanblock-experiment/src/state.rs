use crate::config::RunConfig;
use scanblock_core::{BlockSpec, RunPhase, TriggerEvent};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum BlockEvent {
    /// The start pulse opened the run.
    Started { at: f64 },
    /// A pulse was credited to the current block. `trigger` carries its
    /// position within the block.
    Pulse {
        trigger: TriggerEvent,
        block_index: usize,
        triggers_in_block: u32,
    },
    /// A block became current. `previous` is `None` only for the first block.
    BlockEntered {
        block_index: usize,
        label: String,
        previous: Option<String>,
        triggers_in_block: u32,
    },
    /// The last block reached its threshold.
    Completed { blocks: usize, last: String },
    /// A pulse arrived while no block was counting.
    Ignored { trigger: TriggerEvent },
}

/// Counts pulses into blocks.
///
/// The start pulse is credited to the first block, so every block spans
/// exactly `triggers_per_block` pulses counted from the pulse that opened it.
/// Bursts are tallied one pulse at a time; a burst long enough can walk
/// through several blocks in one tick.
#[derive(Debug)]
pub struct BlockStateMachine {
    config: Arc<RunConfig>,
    phase: RunPhase,
    block_index: usize,
    triggers_in_block: u32,
    credited: u64,
    run_start: Option<f64>,
}

impl BlockStateMachine {
    pub fn new(config: Arc<RunConfig>) -> Self {
        Self {
            config,
            phase: RunPhase::AwaitingStart,
            block_index: 0,
            triggers_in_block: 0,
            credited: 0,
            run_start: None,
        }
    }

    /// Consumes the start pulse. Only the first call has any effect.
    pub fn start(&mut self, start: &TriggerEvent) -> Vec<BlockEvent> {
        let mut events = Vec::new();
        if self.phase != RunPhase::AwaitingStart {
            debug!(phase = ?self.phase, "start pulse after run start, ignoring");
            return events;
        }

        self.run_start = Some(start.timestamp);
        self.phase = RunPhase::InBlock;
        self.triggers_in_block = 1;
        self.credited = 1;

        events.push(BlockEvent::Started {
            at: start.timestamp,
        });
        events.push(BlockEvent::BlockEntered {
            block_index: 0,
            label: self.config.block(0).label.clone(),
            previous: None,
            triggers_in_block: self.triggers_in_block,
        });
        self.check_threshold(&mut events);
        events
    }

    /// Credits pulses in arrival order.
    pub fn on_tick(&mut self, triggers: &[TriggerEvent]) -> Vec<BlockEvent> {
        let mut events = Vec::new();
        for trigger in triggers {
            if !self.phase.counts_triggers() {
                events.push(BlockEvent::Ignored { trigger: *trigger });
                continue;
            }
            let trigger = trigger.credited(self.triggers_in_block);
            self.triggers_in_block += 1;
            self.credited += 1;
            events.push(BlockEvent::Pulse {
                trigger,
                block_index: self.block_index,
                triggers_in_block: self.triggers_in_block,
            });
            self.check_threshold(&mut events);
        }
        events
    }

    fn check_threshold(&mut self, events: &mut Vec<BlockEvent>) {
        if self.triggers_in_block < self.config.triggers_per_block {
            return;
        }
        let previous = self.config.block(self.block_index).label.clone();
        self.triggers_in_block = 0;
        self.block_index += 1;

        if self.block_index / self.config.block_order.len() >= self.config.trial_count {
            self.phase = RunPhase::Complete;
            events.push(BlockEvent::Completed {
                blocks: self.block_index,
                last: previous,
            });
        } else {
            events.push(BlockEvent::BlockEntered {
                block_index: self.block_index,
                label: self.config.block(self.block_index).label.clone(),
                previous: Some(previous),
                triggers_in_block: 0,
            });
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn block_index(&self) -> usize {
        self.block_index
    }

    pub fn trial_index(&self) -> usize {
        self.block_index / self.config.block_order.len()
    }

    pub fn triggers_in_block(&self) -> u32 {
        self.triggers_in_block
    }

    /// Pulses counted into blocks, start pulse included.
    pub fn pulses_credited(&self) -> u64 {
        self.credited
    }

    pub fn run_start(&self) -> Option<f64> {
        self.run_start
    }

    /// `None` before the start pulse and after completion.
    pub fn current_block(&self) -> Option<&BlockSpec> {
        self.phase
            .counts_triggers()
            .then(|| self.config.block(self.block_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Task;
    use proptest::prelude::*;

    fn machine(trials: usize, per_block: u32) -> BlockStateMachine {
        let mut config = RunConfig::for_task(Task::Grasp);
        config.trial_count = trials;
        config.triggers_per_block = per_block;
        BlockStateMachine::new(Arc::new(config))
    }

    fn pulses(from: u64, n: u64) -> Vec<TriggerEvent> {
        (from..from + n)
            .map(|sequence| TriggerEvent::new(sequence as f64 * 2.0, sequence))
            .collect()
    }

    fn entered(events: &[BlockEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                BlockEvent::BlockEntered { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_pulse_counts_toward_first_block() {
        let mut m = machine(1, 4);
        let events = m.start(&pulses(0, 1)[0]);
        assert_eq!(entered(&events), ["Relax"]);
        assert_eq!(m.triggers_in_block(), 1);
        assert_eq!(m.run_start(), Some(0.0));

        // three more close the first block
        let events = m.on_tick(&pulses(1, 3));
        assert_eq!(entered(&events), ["Grasp"]);
        assert_eq!(m.block_index(), 1);
        assert_eq!(m.triggers_in_block(), 0);
    }

    #[test]
    fn single_trial_consumes_thresholds_exactly() {
        let mut m = machine(1, 4);
        let mut all = m.start(&pulses(0, 1)[0]);
        for t in pulses(1, 7) {
            all.extend(m.on_tick(&[t]));
        }
        assert!(m.phase().is_complete());
        assert_eq!(entered(&all), ["Relax", "Grasp"]);
        assert!(matches!(
            all.last(),
            Some(BlockEvent::Completed { blocks: 2, last }) if last == "Grasp"
        ));

        // pulses after completion are not counted
        let late = m.on_tick(&pulses(8, 1));
        assert!(matches!(late[..], [BlockEvent::Ignored { .. }]));
        assert_eq!(m.block_index(), 2);
        assert_eq!(m.pulses_credited(), 8);
    }

    #[test]
    fn credited_pulses_carry_their_position_in_block() {
        let mut m = machine(1, 3);
        m.start(&pulses(0, 1)[0]);
        let events = m.on_tick(&pulses(1, 4));
        let positions: Vec<(u64, u32)> = events
            .iter()
            .filter_map(|e| match e {
                BlockEvent::Pulse { trigger, .. } => {
                    Some((trigger.sequence, trigger.sequence_in_block))
                }
                _ => None,
            })
            .collect();
        // start pulse held position 0 of the first block
        assert_eq!(positions, [(1, 1), (2, 2), (3, 0), (4, 1)]);
    }

    #[test]
    fn burst_carries_over_into_next_block() {
        let mut m = machine(2, 1);
        // threshold 1: the start pulse alone completes block 0
        let events = m.start(&pulses(0, 1)[0]);
        assert_eq!(entered(&events), ["Relax", "Grasp"]);

        // two pulses in one poll walk through two blocks
        let events = m.on_tick(&pulses(1, 2));
        assert_eq!(entered(&events), ["Relax", "Grasp"]);
        assert_eq!(m.block_index(), 3);
    }

    #[test]
    fn burst_needing_one_more_transitions_once() {
        let mut m = machine(1, 3);
        m.start(&pulses(0, 1)[0]);
        m.on_tick(&pulses(1, 1));
        let events = m.on_tick(&pulses(2, 2));
        assert_eq!(entered(&events), ["Grasp"]);
        assert_eq!(m.triggers_in_block(), 1);
    }

    #[test]
    fn pulses_before_start_are_ignored() {
        let mut m = machine(1, 2);
        let events = m.on_tick(&pulses(0, 2));
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, BlockEvent::Ignored { .. })));
        assert_eq!(m.phase(), RunPhase::AwaitingStart);
        assert!(m.current_block().is_none());
    }

    proptest! {
        #[test]
        fn runs_enter_every_block_in_cycling_order(
            trials in 1usize..5,
            per_block in 1u32..6,
            bursts in proptest::collection::vec(1u64..4, 1..60),
        ) {
            let mut m = machine(trials, per_block);
            let mut all = m.start(&pulses(0, 1)[0]);
            let mut seq = 1;
            for n in bursts {
                let batch = pulses(seq, n);
                seq += n;
                all.extend(m.on_tick(&batch));
                prop_assert!(m.triggers_in_block() < per_block || m.phase().is_complete());
            }
            // top up so the run always finishes
            while !m.phase().is_complete() {
                all.extend(m.on_tick(&pulses(seq, 1)));
                seq += 1;
            }

            let labels = entered(&all);
            prop_assert_eq!(labels.len(), trials * 2);
            for (i, label) in labels.iter().enumerate() {
                let want = if i % 2 == 0 { "Relax" } else { "Grasp" };
                prop_assert_eq!(label.as_str(), want);
            }
            let completed = all
                .iter()
                .filter(|e| matches!(e, BlockEvent::Completed { .. }))
                .count();
            prop_assert_eq!(completed, 1);
        }
    }
}
