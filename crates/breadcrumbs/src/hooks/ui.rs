//! Click capture.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vigil_core::{Breadcrumb, BreadcrumbHint, BreadcrumbType};

use super::{HookSlot, InstrumentationAdapter, guarded};
use crate::manager::BreadcrumbManager;

/// Longest visible text kept from a clicked element.
const MAX_TEXT_LEN: usize = 50;

/// The element a click landed on, as reported by the host UI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickTarget {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ClickTarget {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// CSS-like selector, e.g. `button#save.primary.large`.
    pub fn selector(&self) -> String {
        let mut selector = self.tag.to_lowercase();
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            selector.push('#');
            selector.push_str(id);
        }
        for class in self.classes.iter().filter(|c| !c.is_empty()) {
            selector.push('.');
            selector.push_str(class);
        }
        selector
    }
}

/// Records a breadcrumb for each reported click while installed.
#[derive(Clone, Default)]
pub struct ClickHook {
    slot: Arc<HookSlot>,
}

impl ClickHook {
    /// Report a click. Does nothing unless the hook is installed.
    pub fn record_click(&self, target: &ClickTarget) {
        guarded(self.name(), || {
            let Some(manager) = self.slot.manager() else {
                return;
            };

            let selector = target.selector();
            let text = target
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| vigil_core::sanitize::truncate(t.to_string(), MAX_TEXT_LEN));

            let mut crumb = Breadcrumb::new(selector.clone())
                .with_type(BreadcrumbType::Ui)
                .with_category("ui.click")
                .with_data("selector", selector.as_str());
            if let Some(text) = &text {
                crumb = crumb.with_data("text", text.as_str());
            }

            manager.add(crumb, Some(BreadcrumbHint::Click { selector, text }));
        });
    }
}

impl InstrumentationAdapter for ClickHook {
    fn name(&self) -> &str {
        "click"
    }

    fn install(&self, manager: &BreadcrumbManager) {
        self.slot.install(manager);
    }

    fn uninstall(&self) {
        self.slot.uninstall();
    }

    fn is_installed(&self) -> bool {
        self.slot.is_installed()
    }
}
