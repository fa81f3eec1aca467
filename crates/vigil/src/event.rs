//! Report events: what the catcher sends when something goes wrong.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::Breadcrumb;

/// `catcher_type` of error reports on the wire.
pub const ERRORS_CATCHER_TYPE: &str = "errors/rust";

/// Severity of a reported event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
    Fatal,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// A single report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvent {
    pub title: String,
    #[serde(default)]
    pub level: EventLevel,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub context: serde_json::Map<String, serde_json::Value>,
    /// Trail leading up to the event. Filled from the catcher's buffer when
    /// left empty.
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReportEvent {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            level: EventLevel::default(),
            context: serde_json::Map::new(),
            breadcrumbs: Vec::new(),
            timestamp: None,
        }
    }

    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Envelope an event travels in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub token: String,
    pub catcher_type: String,
    pub payload: ReportEvent,
}

impl EventMessage {
    pub fn new(token: impl Into<String>, payload: ReportEvent) -> Self {
        Self {
            token: token.into(),
            catcher_type: ERRORS_CATCHER_TYPE.to_string(),
            payload,
        }
    }
}
