//! Faultline
//!
//! Rich errors that carry the stack of the call site that created them,
//! a graph model over causal, joined and associated errors, and five
//! printable renderings that point at the line where things went wrong.
//!
//! # Module Structure
//!
//! - [`stack`] - Stack dump parsing and capture
//! - [`detect`] - Panic detection over captured stacks
//! - [`error`] - The rich error node type
//! - [`chain`] - Walks over the error graph
//! - [`format`] - Printable renderings
//! - [`panic`] - Turning panics into rich errors
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use faultline::prelude::*;
//!
//! fn open() -> Result<(), RichError> {
//!     let io = std::io::Error::other("permission denied");
//!     Err(RichError::wrap(io, "opening journal"))
//! }
//!
//! let err = open().unwrap_err();
//! let line = format(Some(&err), Format::CodeLocation);
//! assert!(line.starts_with("opening journal: permission denied at "));
//! ```

pub mod chain;
pub mod config;
pub mod detect;
pub mod error;
pub mod format;
pub mod panic;
pub mod prelude;
pub mod stack;
