// Purpose: Defines the state logging interface and its file and in-memory sinks.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateLogError;
use crate::state::{SharedState, NUM_INGREDIENTS, NUM_SMOKERS};

/// Durable sink for snapshots of [`SharedState`].
///
/// Called synchronously from inside every critical section, after the
/// mutation and before the mutex is released, so snapshots appear in the
/// same order as the mutations they record.
#[cfg_attr(test, mockall::automock)]
pub trait StateLogger: Send + Sync {
    fn save_state(&self, state: &SharedState) -> Result<(), StateLogError>;
}

//-----------------------------------------------------------------------------
// In-memory sink
//-----------------------------------------------------------------------------

/// Keeps a copy of every snapshot in order.
#[derive(Debug, Default)]
pub struct InMemoryStateLogger {
    snapshots: Mutex<Vec<SharedState>>,
}

impl InMemoryStateLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots recorded so far.
    pub fn snapshots(&self) -> Vec<SharedState> {
        self.snapshots
            .lock()
            .map(|snapshots| snapshots.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<SharedState> {
        self.snapshots.lock().ok()?.last().cloned()
    }
}

impl StateLogger for InMemoryStateLogger {
    fn save_state(&self, state: &SharedState) -> Result<(), StateLogError> {
        let mut snapshots = self.snapshots.lock().map_err(|_| StateLogError::Poisoned)?;
        snapshots.push(state.clone());
        Ok(())
    }
}

//-----------------------------------------------------------------------------
// File sink
//-----------------------------------------------------------------------------

/// Line format of a [`FileStateLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    /// Fixed-width columns, one row per snapshot, preceded by a header.
    #[default]
    Table,
    /// One [`SnapshotRecord`] JSON object per line.
    Json,
}

/// A snapshot as written by the JSON format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub state: SharedState,
}

#[derive(Debug)]
struct FileSink {
    file: File,
    seq: u64,
}

/// Appends every snapshot to a file, flushing each line.
#[derive(Debug)]
pub struct FileStateLogger {
    path: PathBuf,
    format: SnapshotFormat,
    sink: Mutex<FileSink>,
}

impl FileStateLogger {
    /// Create (truncating) the log file and write its header. `key` is the
    /// access key identifying the simulation.
    pub fn create(
        path: impl AsRef<Path>,
        key: u32,
        format: SnapshotFormat,
    ) -> Result<Self, StateLogError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        if format == SnapshotFormat::Table {
            file.write_all(table_header(key).as_bytes())?;
            file.flush()?;
        }

        Ok(Self {
            path,
            format,
            sink: Mutex::new(FileSink { file, seq: 0 }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }
}

impl StateLogger for FileStateLogger {
    fn save_state(&self, state: &SharedState) -> Result<(), StateLogError> {
        let mut sink = self.sink.lock().map_err(|_| StateLogError::Poisoned)?;
        let line = match self.format {
            SnapshotFormat::Table => table_row(state),
            SnapshotFormat::Json => {
                let record = SnapshotRecord {
                    seq: sink.seq,
                    at: Utc::now(),
                    state: state.clone(),
                };
                serde_json::to_string(&record)?
            }
        };
        sink.seq += 1;
        writeln!(sink.file, "{line}")?;
        sink.file.flush()?;
        Ok(())
    }
}

fn table_header(key: u32) -> String {
    let mut header = String::new();
    let _ = writeln!(
        header,
        "{:>20}Smokers - Description of the internal state (key {key:#x})\n",
        ""
    );
    for i in 0..NUM_SMOKERS {
        let _ = write!(header, " S{i:<3}");
    }
    header.push_str(" AG  ");
    for i in 0..NUM_INGREDIENTS {
        let _ = write!(header, " I{i:<2}");
    }
    for i in 0..NUM_SMOKERS {
        let _ = write!(header, "  C{i:<2}");
    }
    header.push_str(" CL\n");
    header
}

fn table_row(state: &SharedState) -> String {
    let mut row = String::new();
    for status in state.smoker_status {
        let _ = write!(row, " {}", status.mnemonic());
    }
    let _ = write!(row, " {} ", state.agent_status.mnemonic());
    for count in state.ingredient_count {
        let _ = write!(row, " {count:>3}");
    }
    for count in state.cigarette_count {
        let _ = write!(row, " {count:>4}");
    }
    let _ = write!(row, "  {}", if state.closing { 'Y' } else { 'N' });
    row
}
