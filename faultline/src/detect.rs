//! Panic detection over captured stacks.
//!
//! A stack captured while a panic unwinds carries the runtime's panic
//! machinery between the capture point and the code that panicked. The
//! [`PanicDetector`] scans for two marker frames named by a
//! [`PanicMarkers`] record:
//!
//! - the *deferred invoker*, the runtime frame that hands control to the
//!   interceptor; the frame just older than it is the recovery frame;
//! - the *fault entry*, where the panic enters the runtime; the first frame
//!   older than it that is not runtime-internal is the panic site.
//!
//! Marker names depend on the runtime version, so they are plain data that
//! can be loaded from configuration and swapped without touching the scan.

use crate::config::ConfigError;
use crate::stack::StackModel;
use serde::{Deserialize, Serialize};

/// Names the standard library has used for the function that dispatches a
/// panic to the installed hook.
pub const RUST_PANIC_DISPATCHERS: &[&str] = &[
    "std::panicking::rust_panic_with_hook",
    "std::panicking::panic_with_hook",
];

/// Marker configuration for one runtime version family.
///
/// Each marker is a list of names, so one record can cover runtime versions
/// that renamed the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanicMarkers {
    /// Frames that invoke the interceptor while the stack unwinds.
    pub deferred_invokers: Vec<String>,

    /// Frames through which a fault enters the runtime.
    pub fault_entries: Vec<String>,

    /// Name prefixes of runtime-internal frames, skipped when looking for
    /// the panic site.
    #[serde(default)]
    pub internal_prefixes: Vec<String>,
}

impl PanicMarkers {
    /// Build a marker set with one name per marker.
    pub fn new<I, S>(
        deferred_invoker: impl Into<String>,
        fault_entry: impl Into<String>,
        internal_prefixes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deferred_invokers: vec![deferred_invoker.into()],
            fault_entries: vec![fault_entry.into()],
            internal_prefixes: internal_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Markers for stacks captured from a panic hook of the Rust runtime.
    pub fn rust() -> Self {
        let dispatchers: Vec<String> = RUST_PANIC_DISPATCHERS
            .iter()
            .map(|name| name.to_string())
            .collect();
        Self {
            deferred_invokers: dispatchers.clone(),
            fault_entries: dispatchers,
            internal_prefixes: ["std::", "core::", "alloc::", "rust_begin_unwind", "__rust"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// True if `function` is one of the deferred-invoker names.
    pub fn is_deferred_invoker(&self, function: &str) -> bool {
        self.deferred_invokers.iter().any(|name| name == function)
    }

    /// True if `function` is one of the fault-entry names.
    pub fn is_fault_entry(&self, function: &str) -> bool {
        self.fault_entries.iter().any(|name| name == function)
    }

    /// True if `function` belongs to the runtime rather than user code.
    ///
    /// Qualified trait-impl names (`<core::option::Option<T>>::unwrap`) are
    /// matched without their leading `<`.
    pub fn is_internal(&self, function: &str) -> bool {
        let function = function.trim_start_matches('<');
        self.internal_prefixes
            .iter()
            .any(|prefix| function.starts_with(prefix.as_str()))
    }

    /// Validate the marker set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if a marker list is empty or
    /// holds an empty name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_names("markers.deferred_invokers", &self.deferred_invokers)?;
        validate_names("markers.fault_entries", &self.fault_entries)?;
        if self.internal_prefixes.iter().any(String::is_empty) {
            return Err(ConfigError::ValidationError(
                "markers.internal_prefixes cannot contain an empty prefix".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_names(field: &str, names: &[String]) -> Result<(), ConfigError> {
    if names.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{field} needs at least one name"
        )));
    }
    if names.iter().any(String::is_empty) {
        return Err(ConfigError::ValidationError(format!(
            "{field} cannot contain an empty name"
        )));
    }
    Ok(())
}

impl Default for PanicMarkers {
    fn default() -> Self {
        Self::rust()
    }
}

/// Frame indices of a detected panic, both into [`StackModel::frames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PanicSite {
    /// Frame just older than the deferred invoker.
    pub recovery_index: usize,
    /// First non-internal frame older than the fault entry.
    pub panic_index: usize,
}

/// Decides whether a stack was captured during a panic.
#[derive(Debug, Clone, Default)]
pub struct PanicDetector {
    markers: PanicMarkers,
}

impl PanicDetector {
    /// Create a detector for the given marker set.
    pub fn new(markers: PanicMarkers) -> Self {
        Self { markers }
    }

    /// The marker set in use.
    pub fn markers(&self) -> &PanicMarkers {
        &self.markers
    }

    /// Locate the recovery and panic frames of `stack`.
    ///
    /// Returns `None` unless both markers are found in one scan with their
    /// derived indices inside the stack.
    pub fn indices(&self, stack: &StackModel) -> Option<PanicSite> {
        let frames = stack.frames();
        let mut found = 0;
        let mut recovery_index = None;
        let mut panic_index = None;

        for (i, frame) in frames.iter().enumerate() {
            let function = frame.function();

            if recovery_index.is_none()
                && self.markers.is_deferred_invoker(function)
                && i + 1 < frames.len()
            {
                recovery_index = Some(i + 1);
                found += 1;
            }

            if panic_index.is_none() && self.markers.is_fault_entry(function) {
                let site = frames[i + 1..]
                    .iter()
                    .position(|older| !self.markers.is_internal(older.function()));
                if let Some(offset) = site {
                    panic_index = Some(i + 1 + offset);
                    found += 1;
                }
            }

            if found == 2 {
                if let (Some(recovery_index), Some(panic_index)) = (recovery_index, panic_index) {
                    return Some(PanicSite {
                        recovery_index,
                        panic_index,
                    });
                }
            }
        }
        None
    }

    /// Shorthand for `self.indices(stack).is_some()`.
    pub fn is_panic(&self, stack: &StackModel) -> bool {
        self.indices(stack).is_some()
    }
}
