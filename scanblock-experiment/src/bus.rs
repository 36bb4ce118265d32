use crossbeam_channel::{Sender, unbounded};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("listener '{0}' is closed")]
    Closed(String),
}

/// A sink for human-readable run status lines.
pub trait Listener: Send {
    fn name(&self) -> &str;

    /// `stamp` is the run-clock time the message refers to.
    fn notify(&mut self, stamp: f64, message: &str) -> Result<(), ListenerError>;
}

/// Fans status lines out to every listener in registration order.
///
/// A failing listener is reported and skipped; the rest still hear the message.
#[derive(Default)]
pub struct NotificationBus {
    listeners: Vec<Box<dyn Listener>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: impl Listener + 'static) -> Self {
        self.subscribe(listener);
        self
    }

    pub fn subscribe(&mut self, listener: impl Listener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns how many listeners failed.
    pub fn publish(&mut self, stamp: f64, message: &str) -> usize {
        debug!(stamp, message, "publish");
        let mut failures = 0;
        for listener in &mut self.listeners {
            if let Err(e) = listener.notify(stamp, message) {
                warn!(listener = listener.name(), error = %e, "listener failed");
                failures += 1;
            }
        }
        failures
    }
}

/// Echoes status lines to stdout.
#[derive(Debug, Default)]
pub struct ConsoleListener;

impl Listener for ConsoleListener {
    fn name(&self) -> &str {
        "console"
    }

    fn notify(&mut self, _stamp: f64, message: &str) -> Result<(), ListenerError> {
        let mut out = io::stdout().lock();
        writeln!(out, "{message}")?;
        Ok(())
    }
}

/// Appends `stamp<TAB>message` lines to a file, flushing every line so the
/// log survives a crash.
pub struct FileListener {
    path: PathBuf,
    out: BufWriter<File>,
}

impl FileListener {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Listener for FileListener {
    fn name(&self) -> &str {
        "file"
    }

    fn notify(&mut self, stamp: f64, message: &str) -> Result<(), ListenerError> {
        writeln!(self.out, "{stamp:.4}\t{}", message.replace('\n', " "))?;
        self.out.flush()?;
        Ok(())
    }
}

/// Runs a listener on its own thread so a slow sink never holds up the
/// control loop. Failures of the inner listener are logged on that thread.
pub struct BackgroundListener {
    name: String,
    tx: Option<Sender<(f64, String)>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundListener {
    pub fn spawn(mut inner: impl Listener + 'static) -> io::Result<Self> {
        let name = format!("background:{}", inner.name());
        let (tx, rx) = unbounded::<(f64, String)>();
        let worker = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for (stamp, message) in rx {
                    if let Err(e) = inner.notify(stamp, &message) {
                        warn!(listener = inner.name(), error = %e, "listener failed");
                    }
                }
            })?;
        Ok(Self {
            name,
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl Listener for BackgroundListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&mut self, stamp: f64, message: &str) -> Result<(), ListenerError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ListenerError::Closed(self.name.clone()))?;
        tx.send((stamp, message.to_string()))
            .map_err(|_| ListenerError::Closed(self.name.clone()))
    }
}

impl Drop for BackgroundListener {
    fn drop(&mut self) {
        // closing the channel lets the worker drain and exit
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
