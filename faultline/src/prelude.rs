//! Prelude module for common re-exports.
//!
//! ```rust
//! use faultline::prelude::*;
//! ```

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{Capabilities, ResultExt, RichError, RichKind, SharedError};

// ─── Stacks ─────────────────────────────────────────────────────────
pub use crate::stack::{CaptureError, Frame, StackModel, capture};

// ─── Detection ──────────────────────────────────────────────────────
pub use crate::detect::{PanicDetector, PanicMarkers, PanicSite};

// ─── Traversal ──────────────────────────────────────────────────────
pub use crate::chain::{
    Edge, collect_stacks, dump_types, enumerate_chains, first_panic_stack, unwrap_once,
};

// ─── Formatting ─────────────────────────────────────────────────────
pub use crate::format::{Format, Formatter, format};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, FaultlineConfig, LogLevel};
