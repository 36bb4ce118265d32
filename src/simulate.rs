use crate::settings::Simulation;
use anyhow::Result;
use crossbeam_channel::Sender;
use rand::Rng;
use scanblock_core::InputSignal;
use scanblock_timing::Timer;
use std::io::{BufRead, BufReader};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

/// Pretends to be the scanner: sends `key` every TR, first pulse after
/// `lead_in`. Stops once nobody is listening any more.
pub fn spawn_scanner<T: Timer + 'static>(
    sim: Simulation,
    key: String,
    lead_in: Duration,
    timer: T,
    tx: Sender<InputSignal>,
) -> Result<JoinHandle<u64>> {
    info!(tr = sim.tr_secs, jitter_ms = sim.jitter_ms, "simulated scanner enabled");
    let handle = std::thread::Builder::new()
        .name("simulated-scanner".into())
        .spawn(move || {
            let mut rng = rand::rng();
            let first = timer.now() + lead_in.as_secs_f64();
            let mut sent = 0u64;
            loop {
                let jitter = if sim.jitter_ms > 0.0 {
                    rng.random_range(-sim.jitter_ms..=sim.jitter_ms) / 1000.0
                } else {
                    0.0
                };
                let due = first + sent as f64 * sim.tr_secs + jitter;
                timer.sleep(Duration::from_secs_f64((due - timer.now()).max(0.0)));
                if tx.send(InputSignal::new(key.as_str(), timer.now())).is_err() {
                    break;
                }
                sent += 1;
            }
            debug!(sent, "simulated scanner stopped");
            sent
        })?;
    Ok(handle)
}

/// Forwards key names typed on stdin, one per line. Lets a headless run be
/// driven by hand or by a script piped into it.
pub fn spawn_stdin_keys<T: Timer + 'static>(timer: T, tx: Sender<InputSignal>) -> Result<JoinHandle<()>> {
    spawn_line_keys(BufReader::new(std::io::stdin()), timer, tx)
}

fn spawn_line_keys<R, T>(input: R, timer: T, tx: Sender<InputSignal>) -> Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
    T: Timer + 'static,
{
    let handle = std::thread::Builder::new()
        .name("stdin-keys".into())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                let key = line.trim();
                if key.is_empty() {
                    continue;
                }
                if tx.send(InputSignal::new(key, timer.now())).is_err() {
                    break;
                }
            }
        })?;
    Ok(handle)
}
