//! Rich error values.
//!
//! [`RichError`] is the node type of the error graph. Each value is one of
//! a closed set of variants ([`RichKind`]), and each variant exposes a
//! subset of the graph [`Capabilities`]: a causal predecessor, joined
//! siblings, an associated side error, a captured stack, a key/value pair.
//! Foreign errors take part in the graph through [`Error::source`] only.
//!
//! Nodes are immutable once built. Edges hold [`SharedError`] handles, so
//! one node can be reachable along several paths without being copied.

use crate::stack::{self, StackModel};
use bitflags::bitflags;
use static_assertions::assert_impl_all;
use std::any::type_name;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Graph capabilities exposed by an error node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Has a "caused by" predecessor.
        const CAUSAL         = 0x01;
        /// Aggregates several causes.
        const JOINABLE       = 0x02;
        /// Carries an unrelated-but-relevant second error.
        const ASSOCIATED     = 0x04;
        /// Carries a captured stack.
        const STACKED        = 0x08;
        /// Carries a key/value annotation.
        const KEY_VALUED     = 0x10;
        /// Renders its own block in long output.
        const SELF_RENDERING = 0x20;
    }
}

impl Capabilities {
    /// Capabilities of an arbitrary error value.
    pub fn of(error: &(dyn Error + 'static)) -> Self {
        match error.downcast_ref::<RichError>() {
            Some(rich) => rich.capabilities(),
            None if error.source().is_some() => Self::CAUSAL,
            None => Self::empty(),
        }
    }
}

// ─── SharedError ────────────────────────────────────────────────────

/// Shareable handle to an error node.
///
/// Clones point at the same node. The concrete type name is recorded when
/// the error enters the graph, since it cannot be recovered from a trait
/// object later.
#[derive(Clone)]
pub struct SharedError {
    error: Arc<dyn Error + Send + Sync + 'static>,
    type_name: &'static str,
}

assert_impl_all!(SharedError: Send, Sync, Clone);

impl SharedError {
    /// Move `error` into a new shared node.
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            error: Arc::new(error),
            type_name: type_name::<E>(),
        }
    }

    /// The node as a plain error reference.
    pub fn as_error(&self) -> &(dyn Error + 'static) {
        &*self.error
    }

    /// Concrete type name recorded at construction.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Downcast to the concrete type.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.as_error().downcast_ref::<E>()
    }

    /// True if both handles point at the same node.
    pub fn ptr_eq(&self, other: &SharedError) -> bool {
        Arc::ptr_eq(&self.error, &other.error)
    }
}

impl<E> From<E> for SharedError
where
    E: Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.error, f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.error, f)
    }
}

// ─── RichError ──────────────────────────────────────────────────────

/// Variant of a [`RichError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RichKind {
    /// A new error with its own message.
    Message,
    /// A cause with an added message.
    Wrap,
    /// A cause with a stack attached, message unchanged.
    WithStack,
    /// Several causes combined.
    Join,
    /// A cause plus an associated side error.
    Associate,
    /// A cause annotated with a key/value pair.
    KeyValue,
    /// A panic turned into an error.
    Panic,
}

impl RichKind {
    /// Short lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            RichKind::Message => "message",
            RichKind::Wrap => "wrap",
            RichKind::WithStack => "stack",
            RichKind::Join => "join",
            RichKind::Associate => "associate",
            RichKind::KeyValue => "key-value",
            RichKind::Panic => "panic",
        }
    }
}

enum Kind {
    Message(String),
    Wrap { message: String, cause: SharedError },
    WithStack { cause: SharedError },
    Join { errors: Vec<SharedError> },
    Associate { error: SharedError, associated: SharedError },
    KeyValue { cause: SharedError, key: String, value: String },
    Panic { message: String },
}

/// An error value carrying graph edges and, usually, the stack of the call
/// site that created it.
pub struct RichError {
    kind: Kind,
    stack: Option<Arc<StackModel>>,
}

assert_impl_all!(RichError: Send, Sync);

impl RichError {
    /// A new error with a stack captured at the caller.
    ///
    /// # Panics
    ///
    /// Panics if the runtime's stack dump cannot be parsed.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::captured(Kind::Message(message.into()))
    }

    /// Wrap `error` with a message; displays as `message: error`.
    ///
    /// # Panics
    ///
    /// Panics if the runtime's stack dump cannot be parsed.
    #[track_caller]
    pub fn wrap(error: impl Into<SharedError>, message: impl Into<String>) -> Self {
        Self::captured(Kind::Wrap {
            message: message.into(),
            cause: error.into(),
        })
    }

    /// Attach a stack captured at the caller to `error`.
    ///
    /// # Panics
    ///
    /// Panics if the runtime's stack dump cannot be parsed.
    #[track_caller]
    pub fn traced(error: impl Into<SharedError>) -> Self {
        Self::captured(Kind::WithStack {
            cause: error.into(),
        })
    }

    /// Attach an already captured stack to `error`.
    pub fn with_stack(error: impl Into<SharedError>, stack: StackModel) -> Self {
        Self {
            kind: Kind::WithStack {
                cause: error.into(),
            },
            stack: Some(Arc::new(stack)),
        }
    }

    /// Combine several causes. The first is the causal predecessor.
    ///
    /// Returns `None` for an empty input.
    pub fn join<I>(errors: I) -> Option<Self>
    where
        I: IntoIterator,
        I::Item: Into<SharedError>,
    {
        let errors: Vec<SharedError> = errors.into_iter().map(Into::into).collect();
        if errors.is_empty() {
            return None;
        }
        Some(Self {
            kind: Kind::Join { errors },
            stack: None,
        })
    }

    /// Attach `associated`, an error relevant to `error` but not its cause.
    pub fn associate(error: impl Into<SharedError>, associated: impl Into<SharedError>) -> Self {
        Self {
            kind: Kind::Associate {
                error: error.into(),
                associated: associated.into(),
            },
            stack: None,
        }
    }

    /// Annotate `error` with a key/value pair.
    pub fn with_key_value(
        error: impl Into<SharedError>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            kind: Kind::KeyValue {
                cause: error.into(),
                key: key.into(),
                value: value.into(),
            },
            stack: None,
        }
    }

    /// An error describing a panic, with the stack captured while it
    /// unwound.
    pub fn from_panic(message: impl Into<String>, stack: StackModel) -> Self {
        Self {
            kind: Kind::Panic {
                message: message.into(),
            },
            stack: Some(Arc::new(stack)),
        }
    }

    #[track_caller]
    fn captured(kind: Kind) -> Self {
        Self {
            kind,
            stack: Some(Arc::new(stack::capture(0))),
        }
    }

    /// Variant of this node.
    pub fn kind(&self) -> RichKind {
        match &self.kind {
            Kind::Message(_) => RichKind::Message,
            Kind::Wrap { .. } => RichKind::Wrap,
            Kind::WithStack { .. } => RichKind::WithStack,
            Kind::Join { .. } => RichKind::Join,
            Kind::Associate { .. } => RichKind::Associate,
            Kind::KeyValue { .. } => RichKind::KeyValue,
            Kind::Panic { .. } => RichKind::Panic,
        }
    }

    /// Graph capabilities of this node.
    pub fn capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::SELF_RENDERING;
        if self.stack.is_some() {
            capabilities |= Capabilities::STACKED;
        }
        capabilities |= match &self.kind {
            Kind::Message(_) | Kind::Panic { .. } => Capabilities::empty(),
            Kind::Wrap { .. } | Kind::WithStack { .. } => Capabilities::CAUSAL,
            Kind::Join { .. } => Capabilities::CAUSAL | Capabilities::JOINABLE,
            Kind::Associate { .. } => Capabilities::CAUSAL | Capabilities::ASSOCIATED,
            Kind::KeyValue { .. } => Capabilities::CAUSAL | Capabilities::KEY_VALUED,
        };
        capabilities
    }

    /// Stack captured when this node was created.
    pub fn stack(&self) -> Option<&StackModel> {
        self.stack.as_deref()
    }

    /// The causal predecessor (the first cause of a join).
    pub fn cause(&self) -> Option<&SharedError> {
        match &self.kind {
            Kind::Wrap { cause, .. } | Kind::WithStack { cause } | Kind::KeyValue { cause, .. } => {
                Some(cause)
            }
            Kind::Join { errors } => errors.first(),
            Kind::Associate { error, .. } => Some(error),
            Kind::Message(_) | Kind::Panic { .. } => None,
        }
    }

    /// All joined causes, in order; empty unless this is a join.
    pub fn joined(&self) -> &[SharedError] {
        match &self.kind {
            Kind::Join { errors } => errors,
            _ => &[],
        }
    }

    /// The associated side error.
    pub fn associated(&self) -> Option<&SharedError> {
        match &self.kind {
            Kind::Associate { associated, .. } => Some(associated),
            _ => None,
        }
    }

    /// The key/value annotation.
    pub fn key_value(&self) -> Option<(&str, &str)> {
        match &self.kind {
            Kind::KeyValue { key, value, .. } => Some((key.as_str(), value.as_str())),
            _ => None,
        }
    }

    /// Type name shown in long output, e.g. `faultline::RichError(wrap)`.
    pub fn type_label(&self) -> String {
        format!("faultline::RichError({})", self.kind().as_str())
    }
}

impl fmt::Display for RichError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Message(message) => f.write_str(message),
            Kind::Wrap { message, cause } => write!(f, "{message}: {cause}"),
            Kind::WithStack { cause } | Kind::KeyValue { cause, .. } => write!(f, "{cause}"),
            Kind::Join { errors } => {
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
            Kind::Associate { error, .. } => write!(f, "{error}"),
            Kind::Panic { message } => write!(f, "panic: {message}"),
        }
    }
}

impl fmt::Debug for RichError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RichError")
            .field("kind", &self.kind())
            .field("message", &self.to_string())
            .field("frames", &self.stack.as_ref().map(|stack| stack.frames().len()))
            .finish()
    }
}

impl Error for RichError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause().map(SharedError::as_error)
    }
}

// ─── Result helpers ─────────────────────────────────────────────────

/// Wrapping helpers for `Result`, in the spirit of `map_err`.
pub trait ResultExt<T> {
    /// Wrap the error with a message and a stack captured at the caller.
    fn wrap_err(self, message: impl Into<String>) -> Result<T, RichError>;

    /// Attach a stack captured at the caller to the error.
    fn traced(self) -> Result<T, RichError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<SharedError>,
{
    #[track_caller]
    fn wrap_err(self, message: impl Into<String>) -> Result<T, RichError> {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(RichError::wrap(error, message)),
        }
    }

    #[track_caller]
    fn traced(self) -> Result<T, RichError> {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(RichError::traced(error)),
        }
    }
}
