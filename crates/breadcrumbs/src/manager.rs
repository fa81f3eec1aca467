//! Breadcrumb manager. Owns the ring buffer and the built-in hooks.

use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use vigil_core::sanitize::truncate;
use vigil_core::{
    Breadcrumb, BreadcrumbHint, Clock, DefaultSanitizer, Sanitizer, SystemClock,
};

use crate::buffer::RingBuffer;
use crate::hooks::{
    ClickHook, History, HttpHook, InstrumentationAdapter, InstrumentedClient,
    InstrumentedHistory, NavigationHook, panic_message,
};

/// Longest message kept on a breadcrumb, in characters.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Longest category kept on a breadcrumb, in characters.
pub const MAX_CATEGORY_LEN: usize = 64;

/// Filter applied to every breadcrumb before it is stored.
///
/// Returning `None` discards the breadcrumb; returning a (possibly edited)
/// breadcrumb stores it.
pub type BeforeBreadcrumb =
    Arc<dyn Fn(Breadcrumb, Option<&BreadcrumbHint>) -> Option<Breadcrumb> + Send + Sync>;

/// Options applied on [`BreadcrumbManager::init`].
#[derive(Clone)]
pub struct BreadcrumbOptions {
    pub max_breadcrumbs: usize,
    pub track_fetch: bool,
    pub track_navigation: bool,
    pub track_clicks: bool,
    pub before_breadcrumb: Option<BeforeBreadcrumb>,
}

impl BreadcrumbOptions {
    pub fn from_config(config: &vigil_config::BreadcrumbsConfig) -> Self {
        Self {
            max_breadcrumbs: config.max_breadcrumbs,
            track_fetch: config.track_fetch,
            track_navigation: config.track_navigation,
            track_clicks: config.track_clicks,
            before_breadcrumb: None,
        }
    }

    pub fn with_before_breadcrumb(
        mut self,
        filter: impl Fn(Breadcrumb, Option<&BreadcrumbHint>) -> Option<Breadcrumb>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.before_breadcrumb = Some(Arc::new(filter));
        self
    }
}

impl Default for BreadcrumbOptions {
    fn default() -> Self {
        Self::from_config(&vigil_config::BreadcrumbsConfig::default())
    }
}

impl std::fmt::Debug for BreadcrumbOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreadcrumbOptions")
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("track_fetch", &self.track_fetch)
            .field("track_navigation", &self.track_navigation)
            .field("track_clicks", &self.track_clicks)
            .field(
                "before_breadcrumb",
                &self.before_breadcrumb.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

/// Lifecycle of a [`BreadcrumbManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Initialized,
    Destroyed,
}

struct Inner {
    state: ManagerState,
    buffer: RingBuffer<Breadcrumb>,
    before_breadcrumb: Option<BeforeBreadcrumb>,
}

struct Shared {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    sanitizer: Arc<dyn Sanitizer>,
    http: HttpHook,
    navigation: NavigationHook,
    clicks: ClickHook,
    /// Adapters installed by the current `init`, uninstalled on `destroy`.
    installed: Mutex<Vec<Arc<dyn InstrumentationAdapter>>>,
    /// Extra adapters supplied by the host, installed on every `init`.
    extra: Mutex<Vec<Arc<dyn InstrumentationAdapter>>>,
}

/// Handle to a breadcrumb trail. Clones share the same buffer.
#[derive(Clone)]
pub struct BreadcrumbManager {
    shared: Arc<Shared>,
}

/// Non-owning reference held by installed hooks.
#[derive(Clone)]
pub(crate) struct WeakManager(Weak<Shared>);

impl WeakManager {
    pub(crate) fn upgrade(&self) -> Option<BreadcrumbManager> {
        self.0.upgrade().map(|shared| BreadcrumbManager { shared })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl BreadcrumbManager {
    /// A manager using the system clock and the default sanitizer.
    pub fn new() -> Self {
        Self::with_parts(Arc::new(SystemClock), Arc::new(DefaultSanitizer::default()))
    }

    pub fn with_parts(clock: Arc<dyn Clock>, sanitizer: Arc<dyn Sanitizer>) -> Self {
        let defaults = BreadcrumbOptions::default();
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: ManagerState::Uninitialized,
                    buffer: RingBuffer::new(defaults.max_breadcrumbs),
                    before_breadcrumb: None,
                }),
                clock,
                sanitizer,
                http: HttpHook::default(),
                navigation: NavigationHook::default(),
                clicks: ClickHook::default(),
                installed: Mutex::new(Vec::new()),
                extra: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakManager {
        WeakManager(Arc::downgrade(&self.shared))
    }

    /// Arm the manager and install the hooks enabled in `options`.
    ///
    /// Does nothing if already initialized. After [`destroy`](Self::destroy)
    /// this re-arms the manager with the new options.
    ///
    /// A `max_breadcrumbs` of zero is replaced by the default capacity.
    pub fn init(&self, options: BreadcrumbOptions) {
        let capacity = {
            let mut inner = self.shared.inner.lock();
            if inner.state == ManagerState::Initialized {
                debug!("Breadcrumb manager already initialized");
                return;
            }
            let capacity = match options.max_breadcrumbs {
                0 => {
                    let fallback = vigil_config::BreadcrumbsConfig::default().max_breadcrumbs;
                    warn!(
                        fallback,
                        "Configuration corrected: max_breadcrumbs must be > 0"
                    );
                    fallback
                }
                n => n,
            };
            inner.buffer.set_capacity(capacity);
            inner.before_breadcrumb = options.before_breadcrumb.clone();
            inner.state = ManagerState::Initialized;
            capacity
        };

        let mut adapters: Vec<Arc<dyn InstrumentationAdapter>> = Vec::new();
        if options.track_fetch {
            adapters.push(Arc::new(self.shared.http.clone()));
        }
        if options.track_navigation {
            adapters.push(Arc::new(self.shared.navigation.clone()));
        }
        if options.track_clicks {
            adapters.push(Arc::new(self.shared.clicks.clone()));
        }
        adapters.extend(self.shared.extra.lock().iter().cloned());

        for adapter in &adapters {
            adapter.install(self);
            debug!(hook = adapter.name(), "Instrumentation installed");
        }
        *self.shared.installed.lock() = adapters;

        debug!(
            capacity,
            track_fetch = options.track_fetch,
            track_navigation = options.track_navigation,
            track_clicks = options.track_clicks,
            "Breadcrumb manager initialized"
        );
    }

    /// Register an extra adapter, installed now if the manager is armed and
    /// on every later `init`.
    pub fn register_adapter(&self, adapter: Arc<dyn InstrumentationAdapter>) {
        if self.state() == ManagerState::Initialized {
            adapter.install(self);
            self.shared.installed.lock().push(Arc::clone(&adapter));
        }
        self.shared.extra.lock().push(adapter);
    }

    /// Record a breadcrumb.
    ///
    /// The timestamp is filled in if missing, `before_breadcrumb` may edit
    /// or discard it, then the message and data are trimmed before storage.
    /// Ignored unless the manager is initialized.
    pub fn add(&self, breadcrumb: Breadcrumb, hint: Option<BreadcrumbHint>) {
        let before = {
            let inner = self.shared.inner.lock();
            if inner.state != ManagerState::Initialized {
                debug!(state = ?inner.state, "Breadcrumb ignored, manager not initialized");
                return;
            }
            inner.before_breadcrumb.clone()
        };

        let mut breadcrumb = breadcrumb;
        if breadcrumb.timestamp.is_none() {
            breadcrumb.timestamp = Some(self.shared.clock.now());
        }

        if let Some(filter) = before {
            let original = breadcrumb.clone();
            match catch_unwind(AssertUnwindSafe(|| filter(breadcrumb, hint.as_ref()))) {
                Ok(Some(edited)) => breadcrumb = edited,
                Ok(None) => {
                    debug!("Breadcrumb discarded by before_breadcrumb");
                    return;
                }
                Err(panic) => {
                    warn!(
                        reason = %panic_message(panic.as_ref()),
                        "before_breadcrumb panicked, keeping original breadcrumb"
                    );
                    breadcrumb = original;
                }
            }
        }

        let breadcrumb = self.trim(breadcrumb);

        let mut inner = self.shared.inner.lock();
        // destroy() may have run while the filter was executing
        if inner.state != ManagerState::Initialized {
            return;
        }
        inner.buffer.push(breadcrumb);
    }

    fn trim(&self, mut breadcrumb: Breadcrumb) -> Breadcrumb {
        breadcrumb.message = breadcrumb
            .message
            .map(|message| truncate(message, MAX_MESSAGE_LEN));
        breadcrumb.category = breadcrumb
            .category
            .map(|category| truncate(category, MAX_CATEGORY_LEN));

        breadcrumb.data = breadcrumb.data.map(|data| {
            match self.shared.sanitizer.sanitize(serde_json::Value::Object(data)) {
                serde_json::Value::Object(map) => map,
                other => {
                    let mut map = serde_json::Map::new();
                    map.insert("value".into(), other);
                    map
                }
            }
        });
        breadcrumb
    }

    /// Snapshot of the trail, oldest first.
    pub fn get(&self) -> Vec<Breadcrumb> {
        self.shared.inner.lock().buffer.snapshot()
    }

    pub fn clear(&self) {
        self.shared.inner.lock().buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> ManagerState {
        self.shared.inner.lock().state
    }

    /// Uninstall every hook and drop the trail.
    pub fn destroy(&self) {
        let adapters = std::mem::take(&mut *self.shared.installed.lock());
        for adapter in &adapters {
            adapter.uninstall();
            debug!(hook = adapter.name(), "Instrumentation removed");
        }

        let mut inner = self.shared.inner.lock();
        inner.buffer.clear();
        inner.before_breadcrumb = None;
        inner.state = ManagerState::Destroyed;
        debug!("Breadcrumb manager destroyed");
    }

    pub fn http_hook(&self) -> &HttpHook {
        &self.shared.http
    }

    pub fn navigation_hook(&self) -> &NavigationHook {
        &self.shared.navigation
    }

    pub fn click_hook(&self) -> &ClickHook {
        &self.shared.clicks
    }

    /// Wrap an HTTP client so its requests are recorded while `track_fetch` is on.
    pub fn instrument_client(&self, client: reqwest::Client) -> InstrumentedClient {
        InstrumentedClient::new(client, self.shared.http.clone())
    }

    /// Wrap a history so its navigations are recorded while `track_navigation` is on.
    pub fn instrument_history<H: History>(&self, history: H) -> InstrumentedHistory<H> {
        InstrumentedHistory::new(history, self.shared.navigation.clone())
    }
}

impl Default for BreadcrumbManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::{BreadcrumbLevel, ManualClock};

    fn manager_with_capacity(capacity: usize) -> BreadcrumbManager {
        let m = BreadcrumbManager::new();
        m.init(BreadcrumbOptions {
            max_breadcrumbs: capacity,
            ..BreadcrumbOptions::default()
        });
        m
    }

    fn messages(m: &BreadcrumbManager) -> Vec<String> {
        m.get()
            .into_iter()
            .filter_map(|b| b.message)
            .collect()
    }

    #[test]
    fn keeps_last_n_in_insertion_order() {
        let m = manager_with_capacity(3);
        for msg in ["a", "b", "c", "d"] {
            m.add(Breadcrumb::new(msg), None);
        }
        assert_eq!(messages(&m), vec!["b", "c", "d"]);
    }

    #[test]
    fn ignored_before_init() {
        let m = BreadcrumbManager::new();
        m.add(Breadcrumb::new("early"), None);
        assert!(m.is_empty());
        assert_eq!(m.state(), ManagerState::Uninitialized);
    }

    #[test]
    fn timestamp_comes_from_clock_when_missing() {
        let start = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let clock = ManualClock::new(start);
        let m = BreadcrumbManager::with_parts(
            Arc::new(clock.clone()),
            Arc::new(DefaultSanitizer::default()),
        );
        m.init(BreadcrumbOptions::default());

        m.add(Breadcrumb::new("auto"), None);
        let explicit = start - chrono::Duration::seconds(30);
        m.add(Breadcrumb::new("explicit").with_timestamp(explicit), None);

        let trail = m.get();
        assert_eq!(trail[0].timestamp, Some(start));
        assert_eq!(trail[1].timestamp, Some(explicit));
    }

    #[test]
    fn before_breadcrumb_can_discard_and_edit() {
        let m = BreadcrumbManager::new();
        m.init(BreadcrumbOptions::default().with_before_breadcrumb(|mut b, _| {
            if b.message.as_deref() == Some("secret") {
                return None;
            }
            b.level = BreadcrumbLevel::Warning;
            Some(b)
        }));

        m.add(Breadcrumb::new("secret"), None);
        m.add(Breadcrumb::new("public"), None);

        let trail = m.get();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].message.as_deref(), Some("public"));
        assert_eq!(trail[0].level, BreadcrumbLevel::Warning);
    }

    #[test]
    fn discarded_records_do_not_evict() {
        let m = BreadcrumbManager::new();
        m.init(
            BreadcrumbOptions {
                max_breadcrumbs: 2,
                ..BreadcrumbOptions::default()
            }
            .with_before_breadcrumb(|b, _| b.message.as_deref().is_some_and(|s| s != "x").then_some(b)),
        );

        for msg in ["a", "b", "x", "x"] {
            m.add(Breadcrumb::new(msg), None);
        }
        assert_eq!(messages(&m), vec!["a", "b"]);
    }

    #[test]
    fn filter_sees_hint() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let m = BreadcrumbManager::new();
        m.init(BreadcrumbOptions::default().with_before_breadcrumb(move |b, hint| {
            if matches!(hint, Some(BreadcrumbHint::Custom { .. })) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Some(b)
        }));

        m.add(
            Breadcrumb::new("with hint"),
            Some(BreadcrumbHint::Custom { value: json!(1) }),
        );
        m.add(Breadcrumb::new("without"), None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_filter_keeps_original() {
        let m = BreadcrumbManager::new();
        m.init(BreadcrumbOptions::default().with_before_breadcrumb(|_, _| panic!("filter bug")));

        m.add(Breadcrumb::new("survives"), None);
        assert_eq!(messages(&m), vec!["survives"]);
    }

    #[test]
    fn long_message_and_data_are_trimmed() {
        let m = manager_with_capacity(5);
        m.add(
            Breadcrumb::new("m".repeat(2000)).with_data("payload", "p".repeat(1000)),
            None,
        );

        let crumb = &m.get()[0];
        let message = crumb.message.as_deref().unwrap();
        assert_eq!(message.chars().count(), MAX_MESSAGE_LEN + 1);
        assert!(message.ends_with('…'));

        let payload = crumb.data.as_ref().unwrap()["payload"].as_str().unwrap();
        assert!(payload.chars().count() <= 201);
    }

    #[test]
    fn long_category_is_trimmed() {
        let m = manager_with_capacity(5);
        m.add(Breadcrumb::new("a").with_category("c".repeat(500)), None);
        m.add(Breadcrumb::new("b").with_category("ui.click"), None);

        let trail = m.get();
        let category = trail[0].category.as_deref().unwrap();
        assert_eq!(category.chars().count(), MAX_CATEGORY_LEN + 1);
        assert!(category.ends_with('…'));
        assert_eq!(trail[1].category.as_deref(), Some("ui.click"));
    }

    #[test]
    fn zero_capacity_falls_back_to_default() {
        let m = manager_with_capacity(0);
        for n in 0..40 {
            m.add(Breadcrumb::new(format!("crumb {n}")), None);
        }
        let default = vigil_config::BreadcrumbsConfig::default().max_breadcrumbs;
        assert_eq!(m.len(), default);
        assert_eq!(messages(&m).last().map(String::as_str), Some("crumb 39"));
    }

    /// Adapter that counts its install calls and reports through its slot.
    #[derive(Default)]
    struct CountingAdapter {
        slot: crate::hooks::HookSlot,
        installs: AtomicUsize,
    }

    impl CountingAdapter {
        fn emit(&self, message: &str) {
            if let Some(manager) = self.slot.manager() {
                manager.add(Breadcrumb::new(message), None);
            }
        }
    }

    impl InstrumentationAdapter for CountingAdapter {
        fn name(&self) -> &str {
            "counting"
        }

        fn install(&self, manager: &BreadcrumbManager) {
            self.installs.fetch_add(1, Ordering::SeqCst);
            self.slot.install(manager);
        }

        fn uninstall(&self) {
            self.slot.uninstall();
        }

        fn is_installed(&self) -> bool {
            self.slot.is_installed()
        }
    }

    #[test]
    fn registered_adapter_follows_the_lifecycle() {
        let m = BreadcrumbManager::new();
        let adapter = Arc::new(CountingAdapter::default());
        m.register_adapter(Arc::clone(&adapter) as Arc<dyn InstrumentationAdapter>);
        assert!(!adapter.is_installed());

        m.init(BreadcrumbOptions::default());
        assert!(adapter.is_installed());
        adapter.emit("from adapter");
        assert_eq!(messages(&m), vec!["from adapter"]);

        m.destroy();
        assert!(!adapter.is_installed());
        adapter.emit("ignored");

        m.init(BreadcrumbOptions::default());
        assert!(adapter.is_installed());
        assert_eq!(adapter.installs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn adapter_registered_while_armed_installs_at_once() {
        let m = manager_with_capacity(5);
        let adapter = Arc::new(CountingAdapter::default());
        m.register_adapter(Arc::clone(&adapter) as Arc<dyn InstrumentationAdapter>);

        assert!(adapter.is_installed());
        adapter.emit("late adapter");
        assert_eq!(messages(&m), vec!["late adapter"]);

        m.destroy();
        assert!(!adapter.is_installed());
    }

    #[test]
    fn init_twice_is_noop() {
        let m = manager_with_capacity(2);
        m.init(BreadcrumbOptions {
            max_breadcrumbs: 10,
            ..BreadcrumbOptions::default()
        });
        for msg in ["a", "b", "c"] {
            m.add(Breadcrumb::new(msg), None);
        }
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn destroy_clears_and_stops_capture() {
        let m = manager_with_capacity(5);
        m.add(Breadcrumb::new("a"), None);
        m.destroy();

        assert!(m.is_empty());
        assert_eq!(m.state(), ManagerState::Destroyed);
        assert!(!m.http_hook().is_installed());

        m.add(Breadcrumb::new("after destroy"), None);
        assert!(m.is_empty());
    }

    #[test]
    fn reinit_after_destroy_restores_capture() {
        let m = manager_with_capacity(5);
        m.destroy();
        m.init(BreadcrumbOptions::default());

        assert!(m.http_hook().is_installed());
        assert!(m.navigation_hook().is_installed());
        assert!(m.click_hook().is_installed());

        m.add(Breadcrumb::new("back"), None);
        assert_eq!(messages(&m), vec!["back"]);
    }

    #[test]
    fn disabled_hooks_stay_uninstalled() {
        let m = BreadcrumbManager::new();
        m.init(BreadcrumbOptions {
            track_fetch: false,
            track_clicks: false,
            ..BreadcrumbOptions::default()
        });
        assert!(!m.http_hook().is_installed());
        assert!(m.navigation_hook().is_installed());
        assert!(!m.click_hook().is_installed());
    }

    #[test]
    fn clones_share_the_trail() {
        let m = manager_with_capacity(5);
        let other = m.clone();
        other.add(Breadcrumb::new("shared"), None);
        assert_eq!(messages(&m), vec!["shared"]);
        m.clear();
        assert!(other.is_empty());
    }
}
