use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only session event log.
///
/// - default fields are `type`, `session_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - file sinks get one compact JSON object per line (`events.jsonl`)
/// - memory sinks keep the events for the lifetime of the writer
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    sink: EventSink,
    session_id: String,
}

#[derive(Debug)]
enum EventSink {
    File { path: PathBuf, lock: Mutex<()> },
    Memory(Mutex<Vec<Value>>),
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::with_sink(
            EventSink::File {
                path: path.into(),
                lock: Mutex::new(()),
            },
            session_id,
        )
    }

    pub fn in_memory(session_id: impl Into<String>) -> Self {
        Self::with_sink(EventSink::Memory(Mutex::new(Vec::new())), session_id)
    }

    fn with_sink(sink: EventSink, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                sink,
                session_id: session_id.into(),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.inner.sink {
            EventSink::File { path, .. } => Some(path),
            EventSink::Memory(_) => None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }
        let event = Value::Object(event);

        match &self.inner.sink {
            EventSink::File { path, lock } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let line = serde_json::to_string(&event)?;
                let _guard = lock
                    .lock()
                    .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            EventSink::Memory(events) => {
                events
                    .lock()
                    .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?
                    .push(event.clone());
            }
        }
        Ok(event)
    }

    /// Events held by a memory sink, oldest first. File sinks return nothing.
    pub fn recorded(&self) -> Vec<Value> {
        match &self.inner.sink {
            EventSink::Memory(events) => events
                .lock()
                .map(|rows| rows.clone())
                .unwrap_or_default(),
            EventSink::File { .. } => Vec::new(),
        }
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
