mod common;

use common::*;
use scanblock_core::Screen;
use scanblock_experiment::{
    Listener, ListenerError, RunOutcome, SchedulerError, SlideResponse, Task, TriggerError,
};

fn labels(summary: &scanblock_experiment::RunSummary) -> Vec<&str> {
    summary
        .records
        .iter()
        .map(|r| r.event_name.as_str())
        .collect()
}

#[test]
fn single_trial_uses_every_pulse_once() {
    // start pulse + 3 closes Relax, 4 more close Grasp
    let h = Harness::new();
    let summary = h
        .scheduler(config(Task::Grasp, 1, 4), steady_pulses(1.0, 2.0, 7))
        .run()
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(labels(&summary), ["Relax", "Grasp"]);
    assert_eq!(summary.blocks_completed, 2);
    assert_eq!(summary.pulses, 8);
    assert_eq!(summary.run_start, Some(1.0));
}

#[test]
fn surplus_pulses_after_completion_are_left_alone() {
    // start, then 4 + 4 pulses: the run is done after the 7th
    let mut batches = steady_pulses(0.0, 1.0, 4);
    batches.extend(steady_pulses(5.0, 1.0, 3));
    let h = Harness::new();
    let summary = h
        .scheduler(config(Task::Grasp, 1, 4), batches)
        .run()
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(labels(&summary), ["Relax", "Grasp"]);
    assert_eq!(summary.pulses, 8);
}

#[test]
fn every_block_of_every_trial_is_recorded_in_order() {
    let h = Harness::new();
    let trace = h.trace.clone();
    let summary = h
        .scheduler(config(Task::Checkers, 3, 2), steady_pulses(0.0, 1.5, 11))
        .run()
        .unwrap();

    assert_eq!(
        labels(&summary),
        ["Grid", "Relax", "Grid", "Relax", "Grid", "Relax"]
    );
    for pair in summary.records.windows(2) {
        assert!(pair[0].onset <= pair[1].onset);
    }
    let start = summary.run_start.unwrap();
    for r in &summary.records {
        assert_eq!(r.onset0, r.onset - start);
    }

    let messages = bus_messages(&trace);
    assert_eq!(messages[0], "Waiting for scanner");
    assert!(messages[1].starts_with("STARTING: received first TR pulse"));
    let transitions = messages.iter().filter(|m| m.starts_with("block ")).count();
    assert_eq!(transitions, 6);
    assert!(messages.iter().any(|m| m.starts_with("run complete after 6 blocks")));
    assert_eq!(messages.last().map(String::as_str), Some("Done"));
}

#[test]
fn onset_is_the_visible_time_of_the_first_frame() {
    let h = Harness::new();
    let screens = h.presenter.screens.clone();
    let trace = h.trace.clone();
    let summary = h
        .scheduler(config(Task::Grasp, 1, 2), steady_pulses(0.0, 2.0, 3))
        .run()
        .unwrap();

    let screens = screens.lock().unwrap();
    for record in &summary.records {
        let first_frame = screens
            .iter()
            .find(|(s, _)| s.label() == Some(record.event_name.as_str()))
            .map(|(_, visible)| *visible)
            .unwrap();
        assert_eq!(record.onset, first_frame);
    }

    // draw happens before the bus hears about the transition
    let trace = trace.lock().unwrap();
    let drawn = trace.iter().position(|l| l == "draw:Grasp").unwrap();
    let told = trace
        .iter()
        .position(|l| l.starts_with("bus:block 1: Relax -> Grasp"))
        .unwrap();
    assert!(drawn < told);
}

#[test]
fn abort_mid_block_keeps_completed_blocks_only() {
    let mut batches = steady_pulses(0.0, 2.0, 3); // Relax done, Grasp shown
    batches.push(vec![trig(8.0)]);
    batches.push(vec![key("escape", 9.0)]);
    batches.push(vec![trig(10.0)]);

    let h = Harness::new();
    let trace = h.trace.clone();
    let finished = h.presenter.finished.clone();
    let summary = h
        .scheduler(config(Task::Grasp, 1, 4), batches)
        .run()
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Aborted);
    assert_eq!(labels(&summary), ["Relax"]);
    assert_eq!(summary.blocks_completed, 1);
    assert!(finished.lock().unwrap().is_none());
    assert!(
        bus_messages(&trace)
            .iter()
            .any(|m| m.starts_with("ABORTED during Grasp"))
    );
}

#[test]
fn burst_needing_one_pulse_credits_the_rest_to_the_next_block() {
    let batches = vec![
        vec![trig(0.0)],
        vec![trig(1.0)],
        // Relax needs one more; the second pulse belongs to Grasp
        vec![trig(2.0), trig(2.0)],
        vec![trig(3.0)],
        vec![trig(4.0)],
    ];
    let h = Harness::new();
    let summary = h
        .scheduler(config(Task::Grasp, 1, 3), batches)
        .run()
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(labels(&summary), ["Relax", "Grasp"]);
}

#[test]
fn burst_can_pass_through_a_block_in_one_tick() {
    let batches = vec![vec![trig(0.0)], vec![trig(1.0), trig(1.0)], vec![trig(2.0)]];
    let h = Harness::new();
    let screens = h.presenter.screens.clone();
    let summary = h
        .scheduler(config(Task::Grasp, 2, 1), batches)
        .run()
        .unwrap();

    // every block still gets its first frame and its record
    assert_eq!(labels(&summary), ["Relax", "Grasp", "Relax", "Grasp"]);
    let mut drawn: Vec<String> = screens
        .lock()
        .unwrap()
        .iter()
        .filter_map(|(s, _)| s.label().map(str::to_string))
        .collect();
    // static blocks are redrawn every tick
    drawn.dedup();
    assert_eq!(drawn, ["Relax", "Grasp", "Relax", "Grasp"]);
}

#[test]
fn estimates_come_from_the_first_pulses_of_each_parity() {
    // alternating 0.5 s / 1.5 s gaps, like an interleaved two-volume sequence
    // later gaps drift; the first ones must stick
    let mut t = 10.0;
    let mut batches = vec![vec![trig(t)]];
    for gap in [1.5, 0.5, 1.4, 0.6, 1.45, 0.55, 1.5] {
        t += gap;
        batches.push(vec![trig(t)]);
    }
    let h = Harness::new();
    let summary = h
        .scheduler(config(Task::Grasp, 1, 4), batches)
        .run()
        .unwrap();

    assert_eq!(summary.estimate.slot(1), Some(1.5));
    assert_eq!(summary.estimate.slot(0), Some(0.5));
}

#[test]
fn estimate_parity_restarts_with_each_block() {
    // one pulse per block: every pulse after the start opens its block's count
    let batches = vec![
        vec![trig(0.0)],
        vec![trig(1.5)],
        vec![trig(2.0)],
        vec![trig(3.5)],
    ];
    let h = Harness::new();
    let summary = h
        .scheduler(config(Task::Grasp, 2, 1), batches)
        .run()
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.estimate.slots, [Some(1.5), None]);
    assert_eq!(summary.pulses, 4);
}

#[test]
fn burst_tail_after_completion_is_not_counted_or_timed() {
    // the second pulse of the last burst arrives after the run is done
    let batches = vec![vec![trig(0.0)], vec![trig(1.5), trig(1.6)]];
    let h = Harness::new();
    let summary = h
        .scheduler(config(Task::Grasp, 1, 1), batches)
        .run()
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(labels(&summary), ["Relax", "Grasp"]);
    assert_eq!(summary.pulses, 2);
    assert_eq!(summary.estimate.slots, [Some(1.5), None]);
}

#[test]
fn annotation_shows_counts_and_estimates() {
    let mut cfg = config(Task::Grasp, 1, 2);
    cfg.annotate = true;
    let h = Harness::new();
    let screens = h.presenter.screens.clone();
    h.scheduler(cfg, steady_pulses(0.0, 2.0, 3))
        .run()
        .unwrap();

    let screens = screens.lock().unwrap();
    let annotations: Vec<&str> = screens
        .iter()
        .filter_map(|(s, _)| match s {
            Screen::Block { annotation, .. } => annotation.as_deref(),
            _ => None,
        })
        .collect();
    assert_eq!(annotations.first(), Some(&"1@0=Relax 0.000 0.000"));
    assert!(annotations.contains(&"0@1=Grasp 0.000 2.000"));
}

#[test]
fn checkerboard_flips_on_the_flicker_clock() {
    let mut cfg = config(Task::Checkers, 1, 2);
    cfg.poll_interval_ms = 20;
    let mut batches = vec![vec![trig(0.0)]];
    batches.extend(std::iter::repeat_with(Vec::new).take(30));
    batches.push(vec![trig(1.0)]);
    batches.push(vec![trig(2.0)]);
    batches.push(vec![trig(3.0)]);

    let h = Harness::new();
    let screens = h.presenter.screens.clone();
    h.scheduler(cfg, batches).run().unwrap();

    let phases: Vec<u64> = screens
        .lock()
        .unwrap()
        .iter()
        .filter_map(|(s, _)| match s {
            Screen::Block {
                label,
                flicker_phase,
                ..
            } if label == "Grid" => Some(*flicker_phase),
            _ => None,
        })
        .collect();
    // ~0.6 s of grid at 0.1 s per flip
    assert!(phases.len() >= 4, "{phases:?}");
    assert!(phases.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn abort_while_waiting_for_scanner() {
    let batches = vec![vec![key("space", 0.5), key("escape", 1.0)]];
    let h = Harness::new();
    let screens = h.presenter.screens.clone();
    let summary = h
        .scheduler(config(Task::Grasp, 1, 4), batches)
        .run()
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::AbortedBeforeStart);
    assert!(summary.records.is_empty());
    assert_eq!(summary.run_start, None);
    assert_eq!(screens.lock().unwrap().len(), 1);
}

#[test]
fn instruction_slides_run_before_the_wait() {
    let mut cfg = config(Task::Grasp, 2, 1);
    cfg.show_instructions = true;
    cfg.instructions = Task::Grasp.instructions(2);

    let h = Harness::new();
    let slides = h.presenter.slides.clone();
    let summary = h
        .scheduler(cfg, steady_pulses(0.0, 1.0, 3))
        .run()
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    let slides = slides.lock().unwrap();
    assert_eq!(slides.len(), 5);
    assert!(slides[3].contains("2 times"));
}

#[test]
fn abort_on_an_instruction_slide() {
    let mut cfg = config(Task::Grasp, 1, 4);
    cfg.show_instructions = true;
    let mut h = Harness::new();
    h.presenter.slide_responses = vec![SlideResponse::Continue, SlideResponse::Abort];
    let slides = h.presenter.slides.clone();
    let summary = h.scheduler(cfg, Vec::new()).run().unwrap();

    assert_eq!(summary.outcome, RunOutcome::AbortedBeforeStart);
    assert_eq!(slides.lock().unwrap().len(), 2);
}

#[test]
fn renderer_failure_is_fatal() {
    let mut h = Harness::new();
    h.presenter.fail_on_frame = Some(2);
    let err = h
        .scheduler(config(Task::Grasp, 1, 4), steady_pulses(0.0, 1.0, 7))
        .run()
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Presenter(_)));
}

#[test]
fn lost_trigger_input_is_fatal() {
    let h = Harness::new();
    let err = h
        .scheduler(config(Task::Grasp, 1, 4), steady_pulses(0.0, 1.0, 2))
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Trigger(TriggerError::Disconnected)
    ));
}

struct AlwaysFails;

impl Listener for AlwaysFails {
    fn name(&self) -> &str {
        "always-fails"
    }

    fn notify(&mut self, _stamp: f64, _message: &str) -> Result<(), ListenerError> {
        Err(ListenerError::Closed("always-fails".to_string()))
    }
}

#[test]
fn broken_listener_does_not_end_the_run() {
    let mut h = Harness::new();
    h.bus.subscribe(AlwaysFails);
    let summary = h
        .scheduler(config(Task::Grasp, 1, 2), steady_pulses(0.0, 1.0, 3))
        .run()
        .unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.records.len(), 2);
}

#[test]
fn invalid_config_is_rejected_before_the_run() {
    let h = Harness::new();
    let mut cfg = config(Task::Grasp, 1, 4);
    cfg.trial_count = 0;
    let result = scanblock_experiment::Scheduler::new(
        cfg,
        scanblock_experiment::ScriptedSource::default(),
        h.presenter,
        h.clock,
        h.bus,
    );
    assert!(matches!(result, Err(SchedulerError::Config(_))));
}
