//! # Vigil Breadcrumbs
//!
//! A bounded, time-ordered trail of what happened before a failure.
//!
//! Records come from explicit [`BreadcrumbManager::add`] calls and from
//! instrumentation adapters over outbound HTTP, navigation and clicks.
//! The trail keeps the most recent `max_breadcrumbs` records; snapshots
//! are attached to error reports.

pub mod buffer;
pub mod hooks;
pub mod manager;

pub use buffer::RingBuffer;
pub use hooks::{
    ClickHook, ClickTarget, History, HttpHook, InstrumentationAdapter, InstrumentedClient,
    InstrumentedHistory, MemoryHistory, NavigationHook,
};
pub use manager::{BeforeBreadcrumb, BreadcrumbManager, BreadcrumbOptions, ManagerState};
