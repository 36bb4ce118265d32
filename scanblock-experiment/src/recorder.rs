use scanblock_core::{EventRecord, TimingEstimate};
use std::io::Write;
use tracing::warn;

/// Append-only onset log.
///
/// A block's onset is opened when its first frame is visible and committed
/// once the block is over, so the exported table only describes blocks that
/// were presented in full. `record` appends directly.
#[derive(Debug, Default)]
pub struct EventRecorder {
    records: Vec<EventRecord>,
    pending: Option<EventRecord>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finished onset directly. The scheduler goes through
    /// `begin`/`commit` instead, which lands in the same log.
    pub fn record(&mut self, onset: f64, label: &str, start_time: f64) -> &EventRecord {
        self.push(EventRecord::new(onset, label, start_time));
        &self.records[self.records.len() - 1]
    }

    /// Opens the onset of the block now on screen. A block still open is
    /// committed first.
    pub fn begin(&mut self, onset: f64, label: &str, start_time: f64) {
        self.commit();
        self.pending = Some(EventRecord::new(onset, label, start_time));
    }

    pub fn commit(&mut self) -> Option<&EventRecord> {
        let record = self.pending.take()?;
        self.push(record);
        self.records.last()
    }

    /// Drops the open onset, e.g. when the run is aborted mid-block.
    pub fn discard_pending(&mut self) -> Option<EventRecord> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&EventRecord> {
        self.pending.as_ref()
    }

    pub fn export(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<EventRecord> {
        self.records
    }

    fn push(&mut self, record: EventRecord) {
        if let Some(last) = self.records.last() {
            if record.onset < last.onset {
                warn!(
                    label = %record.event_name,
                    onset = record.onset,
                    previous = last.onset,
                    "onset earlier than previous record"
                );
            }
        }
        self.records.push(record);
    }
}

/// Writes `onset,event_name,onset0` rows, header first.
pub fn write_csv<W: Write>(records: &[EventRecord], out: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// File stem carrying both interval estimates, e.g. `XYZ_checkers_tr1-1.500_tr2-0.500`.
pub fn output_stem(subject: &str, task: &str, estimate: &TimingEstimate) -> String {
    format!(
        "{subject}_{task}_tr1-{:.3}_tr2-{:.3}",
        estimate.seconds(0),
        estimate.seconds(1)
    )
}
