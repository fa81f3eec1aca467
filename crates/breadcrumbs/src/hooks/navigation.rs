//! Navigation instrumentation over a [`History`] implementation.

use std::sync::Arc;
use vigil_core::{Breadcrumb, BreadcrumbHint, BreadcrumbType};

use super::{HookSlot, InstrumentationAdapter, guarded};
use crate::manager::BreadcrumbManager;

/// A session history: a stack of locations with a cursor.
///
/// Hosts implement this over their platform's router or history API.
pub trait History: Send {
    /// The current location, if any.
    fn location(&self) -> Option<String>;

    /// Navigate to `url`, adding a history entry.
    fn push_state(&mut self, url: &str);

    /// Replace the current entry with `url`.
    fn replace_state(&mut self, url: &str);

    /// Go back one entry. Returns the new location, or `None` at the start
    /// of the history.
    fn back(&mut self) -> Option<String>;
}

/// In-process [`History`] for hosts without a platform history.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    entries: Vec<String>,
    cursor: usize,
}

impl MemoryHistory {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: vec![initial.into()],
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Option<String> {
        self.entries.get(self.cursor).cloned()
    }

    fn push_state(&mut self, url: &str) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(url.to_string());
        self.cursor = self.entries.len() - 1;
    }

    fn replace_state(&mut self, url: &str) {
        match self.entries.get_mut(self.cursor) {
            Some(entry) => *entry = url.to_string(),
            None => self.push_state(url),
        }
    }

    fn back(&mut self) -> Option<String> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.location()
    }
}

/// Records a breadcrumb for every location change while installed.
#[derive(Clone, Default)]
pub struct NavigationHook {
    slot: Arc<HookSlot>,
}

impl NavigationHook {
    fn record(&self, from: Option<String>, to: Option<String>) {
        guarded(self.name(), || {
            let Some(to) = to else {
                return;
            };
            if from.as_deref() == Some(to.as_str()) {
                return;
            }
            let Some(manager) = self.slot.manager() else {
                return;
            };

            let mut crumb = Breadcrumb::new(to.clone())
                .with_type(BreadcrumbType::Navigation)
                .with_category("navigation")
                .with_data("to", to.as_str());
            if let Some(from) = &from {
                crumb = crumb.with_data("from", from.as_str());
            }

            manager.add(crumb, Some(BreadcrumbHint::Navigation { from, to }));
        });
    }
}

impl InstrumentationAdapter for NavigationHook {
    fn name(&self) -> &str {
        "navigation"
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

/// A [`History`] whose navigations are reported to a [`NavigationHook`].
pub struct InstrumentedHistory<H: History> {
    inner: H,
    hook: NavigationHook,
}

impl<H: History> InstrumentedHistory<H> {
    pub fn new(inner: H, hook: NavigationHook) -> Self {
        Self { inner, hook }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn into_inner(self) -> H {
        self.inner
    }

    fn observe<R>(&mut self, navigate: impl FnOnce(&mut H) -> R) -> R {
        if !self.hook.is_installed() {
            return navigate(&mut self.inner);
        }
        let from = self.inner.location();
        let result = navigate(&mut self.inner);
        self.hook.record(from, self.inner.location());
        result
    }
}

impl<H: History> History for InstrumentedHistory<H> {
    fn location(&self) -> Option<String> {
        self.inner.location()
    }

    fn push_state(&mut self, url: &str) {
        self.observe(|h| h.push_state(url));
    }

    fn replace_state(&mut self, url: &str) {
        self.observe(|h| h.replace_state(url));
    }

    fn back(&mut self) -> Option<String> {
        self.observe(|h| h.back())
    }
}
