mod cli;
mod headless;
mod output;
mod settings;
mod simulate;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use cli::Cli;
use crossbeam_channel::{Receiver, unbounded};
use headless::{FRAME_INTERVAL, HeadlessPresenter};
use scanblock_core::InputSignal;
use scanblock_experiment::{
    BackgroundListener, ChannelSource, ConsoleListener, NotificationBus, RunOutcome, RunSummary,
    Scheduler,
};
use scanblock_render::{FontVec, load_system_font};
use scanblock_timing::HighPrecisionTimer;
use settings::Settings;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const HEADLESS_SIZE: (u32, u32) = (1280, 720);
/// Gives the waiting screen a moment before simulated pulses begin.
const SIMULATION_LEAD_IN: Duration = Duration::from_secs(2);

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_font(path: Option<&Path>) -> Result<Option<FontVec>> {
    if let Some(path) = path {
        return scanblock_render::load_font(path).map(Some);
    }
    let font = load_system_font();
    if font.is_none() {
        warn!("no system font found, text will be drawn as a fixation cross (see --font)");
    }
    Ok(font)
}

fn build_bus(settings: &Settings) -> Result<NotificationBus> {
    let mut bus = NotificationBus::new().with_listener(ConsoleListener);
    if settings.run.logging_enabled {
        let log = output::open_log(&settings.output_dir, &settings.subjid, settings.run.task.name())?;
        info!(path = %log.path().display(), "status log");
        bus.subscribe(BackgroundListener::spawn(log).context("starting log writer")?);
    }
    Ok(bus)
}

fn run_headless(
    settings: &Settings,
    font: Option<FontVec>,
    timer: HighPrecisionTimer,
    bus: NotificationBus,
    keys: Receiver<InputSignal>,
) -> Result<RunSummary> {
    let (w, h) = HEADLESS_SIZE;
    let presenter = HeadlessPresenter::new(w, h, font, timer.clone(), FRAME_INTERVAL)?;
    let scheduler = Scheduler::new(
        settings.run.clone(),
        ChannelSource::new(keys),
        presenter,
        timer,
        bus,
    )?;
    Ok(scheduler.run()?)
}

fn report(summary: &RunSummary) {
    let stats = &summary.frame_stats;
    info!(
        outcome = ?summary.outcome,
        blocks = summary.blocks_completed,
        pulses = summary.pulses,
        records = summary.records.len(),
        tr1 = summary.estimate.seconds(0),
        tr2 = summary.estimate.seconds(1),
        "run finished"
    );
    debug!(
        frames = stats.samples,
        avg_ms = stats.average_frame_time_ns / 1e6,
        jitter_ms = stats.jitter_ns / 1e6,
        max_ms = stats.max_frame_time_ns / 1e6,
        "presenter timing"
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::resolve(&cli)?;
    info!(
        subjid = %settings.subjid,
        task = %settings.run.task,
        trials = settings.run.trial_count,
        triggers_per_block = settings.run.triggers_per_block,
        pulses = settings.run.total_pulses(),
        "run configured"
    );

    let font = load_font(settings.font.as_deref())?;
    let timer = HighPrecisionTimer::new();
    let bus = build_bus(&settings)?;
    let (key_tx, key_rx) = unbounded::<InputSignal>();

    let scanner = match settings.simulate {
        Some(sim) => {
            let key = settings
                .run
                .trigger_keys
                .first()
                .cloned()
                .context("no trigger key to simulate")?;
            Some(simulate::spawn_scanner(
                sim,
                key,
                SIMULATION_LEAD_IN,
                timer.clone(),
                key_tx.clone(),
            )?)
        }
        None => None,
    };

    let summary = if settings.headless {
        // not joined: a terminal stdin may never reach EOF
        simulate::spawn_stdin_keys(timer.clone(), key_tx)?;
        run_headless(&settings, font, timer, bus, key_rx)?
    } else {
        scanblock_app::run_windowed(settings.run.clone(), bus, font, timer, key_tx, key_rx)?
    };

    if let Some(scanner) = scanner {
        let sent = scanner
            .join()
            .map_err(|_| anyhow!("simulated scanner panicked"))?;
        debug!(sent, "simulated pulses");
    }

    report(&summary);
    if settings.run.logging_enabled && summary.outcome != RunOutcome::AbortedBeforeStart {
        output::write_run(&settings.output_dir, &settings.subjid, &settings.run, &summary)?;
    }
    Ok(())
}
