//! # Vigil
//!
//! Client-side capture and delivery of errors, breadcrumbs and performance
//! data.
//!
//! ```no_run
//! use vigil::{Catcher, CatcherOptions, ReportEvent, Severity, Status, VigilConfig};
//!
//! # async fn example() -> vigil::Result<()> {
//! let config = VigilConfig::load().unwrap_or_default();
//! vigil::logging::init(config.debug);
//!
//! let catcher = Catcher::new(CatcherOptions::new(config));
//!
//! let tx = catcher.start_transaction("load_dashboard", Severity::Default)?;
//! let span = tx.start_span("fetch_widgets")?;
//! span.finish(Status::Success);
//! tx.finish(Status::Success);
//!
//! catcher.send(ReportEvent::new("Widget failed to render"))?;
//! catcher.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod catcher;
pub mod event;
pub mod logging;

pub use catcher::{BeforeSend, Catcher, CatcherOptions};
pub use event::{EventLevel, EventMessage, ReportEvent};

pub use vigil_breadcrumbs::{
    BreadcrumbManager, BreadcrumbOptions, ClickTarget, InstrumentedClient, InstrumentedHistory,
    MemoryHistory,
};
pub use vigil_config::VigilConfig;
pub use vigil_core::{
    Breadcrumb, BreadcrumbHint, BreadcrumbLevel, BreadcrumbType, Error, Result,
};
pub use vigil_performance::{PerformanceTracker, Severity, Status, TransactionHandle};
pub use vigil_transport::{ConnectionState, TcpConnector, Transport};
