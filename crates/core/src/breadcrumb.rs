//! Breadcrumb (trail record) types.
//!
//! A breadcrumb is a lightweight, chronological marker of something that
//! happened before a failure: an HTTP call, a navigation, a click, or an
//! explicit note from the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of activity a breadcrumb describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbType {
    #[default]
    Default,
    Request,
    Navigation,
    Ui,
    Logic,
    Error,
}

impl std::fmt::Display for BreadcrumbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Request => write!(f, "request"),
            Self::Navigation => write!(f, "navigation"),
            Self::Ui => write!(f, "ui"),
            Self::Logic => write!(f, "logic"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Severity of a breadcrumb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for BreadcrumbLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single trail record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// When it happened. Assigned on insertion when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(rename = "type", default)]
    pub kind: BreadcrumbType,

    /// Free-form grouping, e.g. `fetch`, `navigation`, `ui.click`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub level: BreadcrumbLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Breadcrumb {
    /// Create an `info` breadcrumb of the default type carrying a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::empty()
        }
    }

    /// A breadcrumb with no message, data or timestamp.
    pub fn empty() -> Self {
        Self {
            timestamp: None,
            kind: BreadcrumbType::Default,
            category: None,
            level: BreadcrumbLevel::Info,
            message: None,
            data: None,
        }
    }

    pub fn with_type(mut self, kind: BreadcrumbType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_level(mut self, level: BreadcrumbLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Insert one key into the structured data, creating the map if needed.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// The raw observation a breadcrumb was derived from.
///
/// Passed to `before_breadcrumb` next to the record so filters can look at
/// what the hook saw, not only at what it wrote down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreadcrumbHint {
    Request {
        method: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Navigation {
        from: Option<String>,
        to: String,
    },
    Click {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Custom {
        value: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let crumb = Breadcrumb::new("GET /api/users")
            .with_type(BreadcrumbType::Request)
            .with_category("fetch")
            .with_level(BreadcrumbLevel::Error)
            .with_data("status_code", 500);

        assert_eq!(crumb.kind, BreadcrumbType::Request);
        assert_eq!(crumb.category.as_deref(), Some("fetch"));
        assert_eq!(crumb.level, BreadcrumbLevel::Error);
        assert_eq!(crumb.data.unwrap()["status_code"], 500);
    }

    #[test]
    fn type_serializes_under_type_key() {
        let crumb = Breadcrumb::new("clicked").with_type(BreadcrumbType::Ui);
        let json = serde_json::to_value(&crumb).unwrap();
        assert_eq!(json["type"], "ui");
        assert_eq!(json["level"], "info");
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn hint_is_tagged() {
        let hint = BreadcrumbHint::Navigation {
            from: Some("/a".into()),
            to: "/b".into(),
        };
        let json = serde_json::to_value(&hint).unwrap();
        assert_eq!(json["kind"], "navigation");
        assert_eq!(json["to"], "/b");
    }

    #[test]
    fn display_matches_serde_names() {
        assert_eq!(BreadcrumbType::Navigation.to_string(), "navigation");
        assert_eq!(BreadcrumbLevel::Warning.to_string(), "warning");
    }
}
