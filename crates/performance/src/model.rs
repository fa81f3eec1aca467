//! Data model for transactions and their spans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::clock::{elapsed_ms, new_id};

// ── Enums ─────────────────────────────────────────────────────────────────

/// How important a transaction is to the sampling policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Default,
    /// Always reported, regardless of duration or sample rate.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Outcome of a span or transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Success,
    Failure,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

// ── Span ──────────────────────────────────────────────────────────────────

/// A timed sub-operation of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    pub transaction_id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds, set on finish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl Span {
    pub(crate) fn open(
        transaction_id: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            transaction_id: transaction_id.into(),
            name: name.into(),
            start_time: now,
            end_time: None,
            duration: None,
            status: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Close the span. Returns `false` if it was already closed.
    pub(crate) fn finish(&mut self, now: DateTime<Utc>, status: Status) -> bool {
        if self.is_finished() {
            return false;
        }
        self.end_time = Some(now);
        self.duration = Some(elapsed_ms(self.start_time, now));
        self.status = Some(status);
        true
    }
}

// ── Transaction ───────────────────────────────────────────────────────────

/// A named, timed unit of work owning its spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds, set on finish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl Transaction {
    pub(crate) fn open(name: impl Into<String>, severity: Severity, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            severity,
            start_time: now,
            end_time: None,
            duration: None,
            spans: Vec::new(),
            status: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub(crate) fn span_mut(&mut self, span_id: &str) -> Option<&mut Span> {
        self.spans.iter_mut().find(|s| s.id == span_id)
    }

    /// Close the transaction and any spans still open.
    ///
    /// Open spans get the transaction's end time and `success`. Returns the
    /// names of the spans closed this way.
    pub(crate) fn finish(&mut self, now: DateTime<Utc>, status: Status) -> Vec<String> {
        let auto_finished = self
            .spans
            .iter_mut()
            .filter_map(|span| span.finish(now, Status::Success).then(|| span.name.clone()))
            .collect();

        self.end_time = Some(now);
        self.duration = Some(elapsed_ms(self.start_time, now));
        self.status = Some(status);
        auto_finished
    }

    /// Milliseconds, or zero while still open.
    pub fn duration_ms(&self) -> u64 {
        self.duration.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn span_finish_is_one_shot() {
        let t0 = Utc::now();
        let mut span = Span::open("tx", "query", t0);
        assert!(span.finish(t0 + Duration::milliseconds(40), Status::Failure));
        assert!(!span.finish(t0 + Duration::milliseconds(90), Status::Success));

        assert_eq!(span.duration, Some(40));
        assert_eq!(span.status, Some(Status::Failure));
    }

    #[test]
    fn transaction_finish_closes_open_spans() {
        let t0 = Utc::now();
        let mut tx = Transaction::open("checkout", Severity::Default, t0);
        let mut done = Span::open(&tx.id, "done", t0);
        done.finish(t0 + Duration::milliseconds(5), Status::Failure);
        tx.spans.push(done);
        tx.spans.push(Span::open(&tx.id, "dangling", t0));

        let end = t0 + Duration::milliseconds(120);
        let auto = tx.finish(end, Status::Success);

        assert_eq!(auto, vec!["dangling".to_string()]);
        assert_eq!(tx.duration_ms(), 120);
        assert_eq!(tx.spans[0].status, Some(Status::Failure));
        assert_eq!(tx.spans[1].end_time, Some(end));
        assert_eq!(tx.spans[1].status, Some(Status::Success));
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(serde_json::to_value(Severity::Critical).unwrap(), "critical");
        assert_eq!(serde_json::to_value(Status::Failure).unwrap(), "failure");
        assert_eq!(Status::Success.to_string(), "success");
    }
}
