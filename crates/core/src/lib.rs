//! # Vigil Core
//!
//! Domain types, traits, and error definitions for the Vigil client-side
//! instrumentation library. It does no I/O and spawns no tasks; it defines
//! the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! The seams that a host platform may want to replace are traits here:
//! - [`Clock`]: where timestamps come from
//! - [`Sanitizer`]: how oversized data is trimmed before storage
//!
//! The transport and instrumentation seams live next to their
//! implementations in `vigil-transport` and `vigil-breadcrumbs`.

pub mod breadcrumb;
pub mod clock;
pub mod error;
pub mod sanitize;

// Re-export key types at crate root for ergonomics
pub use breadcrumb::{Breadcrumb, BreadcrumbHint, BreadcrumbLevel, BreadcrumbType};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result, TrackerError, TransportError};
pub use sanitize::{DefaultSanitizer, Sanitizer, SanitizerLimits};
