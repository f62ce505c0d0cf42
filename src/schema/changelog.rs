//! Schema changelog: structured, append-only records of every schema mutation.
//!
//! The schema owns one injected [`ChangelogSink`]. Sinks receive entries in
//! mutation order and are flushed when the owning store is closed.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::ValueType;
use crate::Result;

// ============================================================================
// Events
// ============================================================================

/// One schema mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    CreateType {
        type_name: String,
    },
    CreateProperty {
        type_name: String,
        property: String,
        value_type: ValueType,
    },
    UpdateProperty {
        type_name: String,
        property: String,
        from: ValueType,
        to: ValueType,
    },
    RemoveProperty {
        type_name: String,
        property: String,
    },
    CreateParent {
        type_name: String,
        parent: String,
    },
    UpdateParent {
        type_name: String,
        from: String,
        to: String,
    },
    RemoveParent {
        type_name: String,
    },
}

impl ChangeEvent {
    /// The type the mutation was applied to.
    pub fn subject(&self) -> &str {
        match self {
            ChangeEvent::CreateType { type_name }
            | ChangeEvent::CreateProperty { type_name, .. }
            | ChangeEvent::UpdateProperty { type_name, .. }
            | ChangeEvent::RemoveProperty { type_name, .. }
            | ChangeEvent::CreateParent { type_name, .. }
            | ChangeEvent::UpdateParent { type_name, .. }
            | ChangeEvent::RemoveParent { type_name } => type_name,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::CreateType { type_name } => write!(f, "CREATE TYPE {type_name}"),
            ChangeEvent::CreateProperty { type_name, property, value_type } => {
                write!(f, "CREATE PROPERTY {property} VALUE {value_type} ON TYPE {type_name}")
            }
            ChangeEvent::UpdateProperty { type_name, property, from, to } => write!(
                f,
                "UPDATE PROPERTY {property} FROM VALUE {from} TO VALUE {to} ON TYPE {type_name}"
            ),
            ChangeEvent::RemoveProperty { type_name, property } => {
                write!(f, "REMOVE PROPERTY {property} ON TYPE {type_name}")
            }
            ChangeEvent::CreateParent { type_name, parent } => {
                write!(f, "CREATE PARENT {parent} ON TYPE {type_name}")
            }
            ChangeEvent::UpdateParent { type_name, from, to } => {
                write!(f, "UPDATE PARENT FROM VALUE {from} TO VALUE {to} ON TYPE {type_name}")
            }
            ChangeEvent::RemoveParent { type_name } => write!(f, "REMOVE PARENT ON TYPE {type_name}"),
        }
    }
}

/// A timestamped changelog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: ChangeEvent,
}

impl ChangeLogEntry {
    pub fn now(event: ChangeEvent) -> Self {
        Self { timestamp: Utc::now(), event }
    }
}

impl fmt::Display for ChangeLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - lifegraph.schema - INFO - {}", self.timestamp.to_rfc3339(), self.event)
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination for changelog entries.
pub trait ChangelogSink: Send {
    fn record(&mut self, entry: &ChangeLogEntry) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChangelog;

impl ChangelogSink for NullChangelog {
    fn record(&mut self, _entry: &ChangeLogEntry) -> Result<()> {
        Ok(())
    }
}

/// Keeps entries in memory. Clones share one buffer, so a caller can keep a
/// handle after giving the sink to a schema.
#[derive(Debug, Default, Clone)]
pub struct MemoryChangelog {
    entries: Arc<Mutex<Vec<ChangeLogEntry>>>,
}

impl MemoryChangelog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ChangeLogEntry> {
        self.entries.lock().clone()
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.entries.lock().iter().map(|e| e.event.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ChangelogSink for MemoryChangelog {
    fn record(&mut self, entry: &ChangeLogEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// Appends one line per entry to a log file.
pub struct FileChangelog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileChangelog {
    /// Open `path` for appending, creating it (and its directory) if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChangelogSink for FileChangelog {
    fn record(&mut self, entry: &ChangeLogEntry) -> Result<()> {
        writeln!(self.writer, "{entry}")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for FileChangelog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
