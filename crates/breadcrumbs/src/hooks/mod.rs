//! Instrumentation adapters: reversible sources of breadcrumbs.
//!
//! An adapter never replaces the primitive it observes. The host routes
//! calls through a thin wrapper ([`InstrumentedClient`], [`InstrumentedHistory`],
//! [`ClickHook::record_click`]) that always calls the original primitive and
//! then, if the adapter is installed, reports what happened to the manager.
//! Uninstalling turns the wrapper into a plain pass-through.

pub mod http;
pub mod navigation;
pub mod ui;

pub use http::{HttpHook, InstrumentedClient};
pub use navigation::{History, InstrumentedHistory, MemoryHistory, NavigationHook};
pub use ui::{ClickHook, ClickTarget};

use parking_lot::RwLock;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::warn;

use crate::manager::{BreadcrumbManager, WeakManager};

/// A source of breadcrumbs that can be attached to and detached from a manager.
///
/// `install` and `uninstall` are idempotent: installing twice records each
/// operation once, uninstalling an adapter that is not installed does nothing.
pub trait InstrumentationAdapter: Send + Sync {
    /// Short identifier used in logs (e.g. "http").
    fn name(&self) -> &str;

    fn install(&self, manager: &BreadcrumbManager);

    fn uninstall(&self);

    fn is_installed(&self) -> bool;
}

/// Where an adapter reports to while installed.
///
/// Holds a weak reference so a hook kept alive by the host never keeps a
/// destroyed manager around.
#[derive(Default)]
pub(crate) struct HookSlot {
    target: RwLock<Option<WeakManager>>,
}

impl HookSlot {
    pub(crate) fn install(&self, manager: &BreadcrumbManager) {
        *self.target.write() = Some(manager.downgrade());
    }

    pub(crate) fn uninstall(&self) {
        self.target.write().take();
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.target.read().as_ref().is_some_and(WeakManager::is_alive)
    }

    pub(crate) fn manager(&self) -> Option<BreadcrumbManager> {
        self.target.read().as_ref().and_then(WeakManager::upgrade)
    }
}

/// Run hook bookkeeping, swallowing panics so the observed operation's
/// result is never affected.
pub(crate) fn guarded(hook: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        warn!(
            hook,
            reason = %panic_message(panic.as_ref()),
            "Instrumentation hook failed, breadcrumb skipped"
        );
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_swallows_panics() {
        let mut ran = false;
        guarded("test", || {
            ran = true;
        });
        assert!(ran);

        guarded("test", || panic!("boom"));
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let err = catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "static");

        let err = catch_unwind(|| panic!("formatted {}", 1)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "formatted 1");
    }

    #[test]
    fn slot_does_not_outlive_manager() {
        let slot = HookSlot::default();
        {
            let manager = BreadcrumbManager::new();
            slot.install(&manager);
            assert!(slot.is_installed());
        }
        assert!(!slot.is_installed());
        assert!(slot.manager().is_none());
    }
}
