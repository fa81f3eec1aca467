//! The catcher, one handle wiring the transport to breadcrumbs and performance.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vigil_breadcrumbs::{BeforeBreadcrumb, BreadcrumbManager, BreadcrumbOptions};
use vigil_config::VigilConfig;
use vigil_core::{Breadcrumb, BreadcrumbHint, Clock, Error, Result, SystemClock};
use vigil_performance::{
    BatchSender, PerformanceTracker, Severity, TrackerOptions, TransactionHandle,
};
use vigil_transport::{Connector, TcpConnector, Transport, TransportOptions};

use crate::event::{EventMessage, ReportEvent};

/// Last look at an event before it is sent. `None` rejects the event.
pub type BeforeSend = Arc<dyn Fn(ReportEvent) -> Option<ReportEvent> + Send + Sync>;

/// Everything a [`Catcher`] is built from.
#[derive(Clone, Default)]
pub struct CatcherOptions {
    pub config: VigilConfig,
    pub before_breadcrumb: Option<BeforeBreadcrumb>,
    pub before_send: Option<BeforeSend>,
}

impl CatcherOptions {
    pub fn new(config: VigilConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn before_breadcrumb(
        mut self,
        filter: impl Fn(Breadcrumb, Option<&BreadcrumbHint>) -> Option<Breadcrumb>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.before_breadcrumb = Some(Arc::new(filter));
        self
    }

    pub fn before_send(
        mut self,
        filter: impl Fn(ReportEvent) -> Option<ReportEvent> + Send + Sync + 'static,
    ) -> Self {
        self.before_send = Some(Arc::new(filter));
        self
    }
}

/// Entry point of the library.
///
/// Owns one [`Transport`], one [`BreadcrumbManager`] and, when enabled, one
/// [`PerformanceTracker`] that sends through the same transport.
pub struct Catcher {
    config: VigilConfig,
    transport: Transport,
    breadcrumbs: BreadcrumbManager,
    performance: Option<PerformanceTracker>,
    before_send: Option<BeforeSend>,
    clock: Arc<dyn Clock>,
}

impl Catcher {
    /// Build a catcher that talks to the collector over TCP. Must be called
    /// inside a tokio runtime.
    pub fn new(options: CatcherOptions) -> Self {
        Self::with_connector(options, Arc::new(TcpConnector::default()))
    }

    pub fn with_connector(options: CatcherOptions, connector: Arc<dyn Connector>) -> Self {
        let mut config = options.config;
        let fixes = config.normalize();
        if !fixes.is_empty() {
            debug!(count = fixes.len(), "Configuration corrected");
        }
        if config.token.is_none() {
            warn!("No integration token configured, the collector may reject reports");
        }

        let transport = Transport::new(connector, TransportOptions::from_config(&config));

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let breadcrumbs = BreadcrumbManager::new();
        breadcrumbs.init(BreadcrumbOptions {
            before_breadcrumb: options.before_breadcrumb,
            ..BreadcrumbOptions::from_config(&config.breadcrumbs)
        });

        let performance = config.performance.enabled.then(|| {
            PerformanceTracker::with_clock(
                Arc::new(transport.clone()) as Arc<dyn BatchSender>,
                TrackerOptions::from_config(&config),
                Arc::clone(&clock),
            )
        });

        info!(
            endpoint = %config.collector_endpoint,
            performance = performance.is_some(),
            "Vigil catcher initialized"
        );

        Self {
            config,
            transport,
            breadcrumbs,
            performance,
            before_send: options.before_send,
            clock,
        }
    }

    /// Report an event.
    ///
    /// The current breadcrumb trail is attached when the event carries none.
    /// Returns [`Error::EventRejected`] when `before_send` drops the event;
    /// delivery itself is fire-and-forget.
    pub fn send(&self, event: ReportEvent) -> Result<()> {
        let mut event = event;
        if event.timestamp.is_none() {
            event.timestamp = Some(self.clock.now());
        }
        if event.breadcrumbs.is_empty() {
            event.breadcrumbs = self.breadcrumbs.get();
        }

        if let Some(filter) = &self.before_send {
            let original = event.clone();
            event = match catch_unwind(AssertUnwindSafe(|| filter(event))) {
                Ok(Some(edited)) => edited,
                Ok(None) => {
                    debug!(title = %original.title, "Event rejected by before_send");
                    return Err(Error::EventRejected);
                }
                Err(_) => {
                    warn!("before_send panicked, sending the original event");
                    original
                }
            };
        }

        let token = self.config.token.clone().unwrap_or_default();
        self.transport.send(&EventMessage::new(token, event));
        Ok(())
    }

    /// Record a breadcrumb on the catcher's trail.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        self.breadcrumbs.add(breadcrumb, None);
    }

    /// Open a performance transaction.
    pub fn start_transaction(
        &self,
        name: impl Into<String>,
        severity: Severity,
    ) -> Result<TransactionHandle> {
        let tracker = self.performance.as_ref().ok_or_else(|| Error::Config {
            message: "performance tracking is disabled".into(),
        })?;
        Ok(tracker.start_transaction(name, severity)?)
    }

    pub fn breadcrumbs(&self) -> &BreadcrumbManager {
        &self.breadcrumbs
    }

    pub fn performance(&self) -> Option<&PerformanceTracker> {
        self.performance.as_ref()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Tear everything down: hooks off, open transactions finished and
    /// flushed, transport drained and closed.
    pub async fn destroy(&self) {
        self.breadcrumbs.destroy();
        if let Some(tracker) = &self.performance {
            tracker.destroy().await;
        }
        self.transport.shutdown().await;
        info!("Vigil catcher destroyed");
    }
}
