use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default capacity of the live console buffer.
pub const DEFAULT_EVENT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveillanceEvent {
    pub level: EventLevel,
    pub source: String,
    pub message: String,
    pub timestamp: NaiveDateTime,
}

/// Destination for surveillance events (alerts raised, degraded sweeps, ...).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SurveillanceEvent);
}

pub fn emit(sink: &dyn EventSink, level: EventLevel, source: &str, message: impl Into<String>) {
    sink.emit(SurveillanceEvent {
        level,
        source: source.to_string(),
        message: message.into(),
        timestamp: chrono::Local::now().naive_local(),
    });
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: SurveillanceEvent) {
        let level = match event.level {
            EventLevel::Info => log::Level::Info,
            EventLevel::Warning => log::Level::Warn,
            EventLevel::Error => log::Level::Error,
        };
        log::log!(target: "revenuelens::events", level, "[{}] {}", event.source, event.message);
    }
}

/// Bounded in-memory buffer; the oldest event is dropped once full.
#[derive(Debug)]
pub struct MemorySink {
    capacity: usize,
    buffer: Mutex<VecDeque<SurveillanceEvent>>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffer: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn events(&self) -> Vec<SurveillanceEvent> {
        self.buffer
            .lock()
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: SurveillanceEvent) {
        if let Ok(mut buffer) = self.buffer.lock() {
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(event);
        }
    }
}
