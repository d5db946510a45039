//! Fan-out of engine events to independent consumers.

use chrono::{DateTime, Utc};
use lmc_engine::{Event, Observer};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// One consumer attached to an [`EventBus`].
pub type Handler = Box<dyn FnMut(&Event) -> Result<(), ObserverError> + Send>;

/// Delivers each event to every handler, in attachment order.
///
/// A handler that fails is logged and the event still reaches the rest.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(String, Handler)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compose(handlers: impl IntoIterator<Item = (String, Handler)>) -> Self {
        Self {
            handlers: handlers.into_iter().collect(),
        }
    }

    pub fn attach(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.push((name.into(), handler));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Observer for EventBus {
    fn observe(&mut self, event: &Event) {
        for (name, handler) in &mut self.handlers {
            if let Err(err) = handler(event) {
                tracing::warn!(observer = %name, event = event.name(), error = %err, "observer failed");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// In-memory, ordered copy of every event in a run.
///
/// Clones share the same buffer, so the caller can read while the run task
/// writes.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self) -> Handler {
        let events = Arc::clone(&self.events);
        Box::new(move |event: &Event| -> Result<(), ObserverError> {
            events.lock().push(event.clone());
            Ok(())
        })
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drain the buffer.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[derive(Serialize)]
struct LogLine<'a> {
    seq: u64,
    timestamp: DateTime<Utc>,
    event: &'a Event,
}

struct LoggerInner {
    writer: Box<dyn Write + Send>,
    seq: u64,
}

/// Writes each event as one JSON object per line:
/// `{"seq": 1, "timestamp": "...", "event": {"kind": "cycle_started", ...}}`.
#[derive(Clone)]
pub struct JsonLinesLogger {
    inner: Arc<Mutex<LoggerInner>>,
}

impl JsonLinesLogger {
    /// Log to `path`, truncating it and creating parent directories.
    pub fn create(path: &Path) -> Result<Self, ObserverError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoggerInner {
                writer: Box::new(writer),
                seq: 0,
            })),
        }
    }

    pub fn handler(&self) -> Handler {
        let inner = Arc::clone(&self.inner);
        Box::new(move |event: &Event| -> Result<(), ObserverError> {
            let mut inner = inner.lock();
            inner.seq += 1;
            let line = LogLine {
                seq: inner.seq,
                timestamp: Utc::now(),
                event,
            };
            serde_json::to_writer(&mut inner.writer, &line)?;
            inner.writer.write_all(b"\n")?;
            Ok(())
        })
    }

    /// Number of events written so far.
    pub fn written(&self) -> u64 {
        self.inner.lock().seq
    }

    pub fn flush(&self) -> Result<(), ObserverError> {
        self.inner.lock().writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sample() -> Vec<Event> {
        vec![
            Event::CycleStarted { cycle: 1, counter: 0 },
            Event::OutputProduced { cycle: 1, value: 7 },
            Event::Halted { cycles: 1 },
        ]
    }

    #[test]
    fn test_bus_delivers_in_attachment_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.attach(
                tag,
                Box::new(move |event: &Event| -> Result<(), ObserverError> {
                    seen.lock().push(format!("{tag}:{}", event.name()));
                    Ok(())
                }),
            );
        }

        bus.observe(&Event::Halted { cycles: 3 });
        assert_eq!(*seen.lock(), vec!["first:halted", "second:halted"]);
    }

    #[test]
    fn test_failing_handler_does_not_block_others() {
        let recorder = Recorder::new();
        let failing: Handler =
            Box::new(|_: &Event| -> Result<(), ObserverError> { Err(ObserverError::Other("boom".into())) });
        let mut bus = EventBus::compose([
            ("failing".to_string(), failing),
            ("recorder".to_string(), recorder.handler()),
        ]);

        for event in sample() {
            bus.observe(&event);
        }
        assert_eq!(recorder.snapshot(), sample());
    }

    #[test]
    fn test_recorder_clones_share_buffer() {
        let recorder = Recorder::new();
        let reader = recorder.clone();
        let mut handler = recorder.handler();
        handler(&Event::Halted { cycles: 1 }).unwrap();

        assert_eq!(reader.len(), 1);
        assert_eq!(reader.take().len(), 1);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_json_lines_logger_format() {
        let buf = SharedBuf::default();
        let logger = JsonLinesLogger::from_writer(buf.clone());
        let mut handler = logger.handler();
        for event in sample() {
            handler(&event).unwrap();
        }
        logger.flush().unwrap();

        let text = String::from_utf8(buf.0.lock().clone()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["seq"], 1);
        assert_eq!(lines[1]["event"]["kind"], "output_produced");
        assert_eq!(lines[1]["event"]["value"], 7);
        assert!(lines[2]["timestamp"].is_string());
        assert_eq!(logger.written(), 3);
    }

    #[test]
    fn test_logger_create_makes_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.jsonl");
        let logger = JsonLinesLogger::create(&path).unwrap();
        let mut handler = logger.handler();
        handler(&Event::Halted { cycles: 0 }).unwrap();
        logger.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
