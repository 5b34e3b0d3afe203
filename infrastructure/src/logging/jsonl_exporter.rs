//! JSONL file writer for mission events.
//!
//! Each [`MissionEvent`] is serialized as a single JSON line with a `type`
//! field and `timestamp`, appended to the file via a buffered writer.

use overmind_application::MissionEventSink;
use overmind_domain::MissionEvent;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Event exporter that writes one JSON object per line.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Appends to an existing file so
/// several runs can share one log. Flushes on `Drop`.
pub struct JsonlEventExporter {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlEventExporter {
    /// Open `path` for appending, creating it and its parent directories.
    ///
    /// Returns `None` if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create event log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open event log file {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Flattens the event into one object: the payload's own fields plus
/// `type`, `timestamp`, `event_id` and `mission_id`. Non-object payloads
/// are kept under `data`.
fn to_record(event: &MissionEvent) -> Value {
    let timestamp = event
        .created_at
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    let mut map = match &event.payload {
        Value::Object(fields) => fields.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other.clone());
            map
        }
    };
    map.insert(
        "type".to_string(),
        Value::String(event.event_type.as_str().to_string()),
    );
    map.insert("timestamp".to_string(), Value::String(timestamp));
    map.insert("event_id".to_string(), Value::from(event.id.get()));
    map.insert("mission_id".to_string(), Value::from(event.mission_id.get()));
    Value::Object(map)
}

impl MissionEventSink for JsonlEventExporter {
    fn record(&self, event: &MissionEvent) {
        let Ok(line) = serde_json::to_string(&to_record(event)) else {
            return;
        };

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

impl Drop for JsonlEventExporter {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}
