//! Stack capture and the immutable stack model.
//!
//! A raw stack dump follows a fixed line grammar:
//!
//! ```text
//! <marker> <thread-id> [<status>]:
//! <function signature>
//! \t<file>:<line> +<offset>
//! ...
//! created by <function>
//! \t<file>:<line> +<offset>
//! ```
//!
//! The `created by` block is present for every thread except the process
//! entry thread. [`StackModel::parse`] turns one such block into frames;
//! [`capture`] asks a [`StackSource`] for a block and treats any parse
//! failure as fatal, since it means the runtime and the grammar disagree.

mod runtime;

pub use runtime::{RuntimeStackSource, StackSource};

use regex::Regex;
use serde::Serialize;
use static_assertions::assert_impl_all;
use std::fmt;
use std::panic::Location;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, error};

/// Lines preceding the first frame pair.
const HEADER_LINES: usize = 1;

/// Lines of a `created by` block.
const CREATOR_LINES: usize = 2;

const CREATOR_PREFIX: &str = "created by ";

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\S+ (\d+) \[([^\]]*)\]:$")
        .expect("stack header: pattern is valid and should always compile")
});

/// Errors produced while parsing a raw stack dump.
///
/// Every variant means the dump does not follow the expected grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The dump contained no lines at all.
    #[error("stack dump is empty")]
    Empty,

    /// The first line is not `<marker> <thread-id> [<status>]:`.
    #[error("malformed stack header: {line:?}")]
    BadHeader {
        /// Offending header line.
        line: String,
    },

    /// A file line does not start with a tab.
    #[error("line {line_no}: file line does not start with a tab: {line:?}")]
    MissingTab {
        /// 1-based line number within the dump.
        line_no: usize,
        /// Offending line.
        line: String,
    },

    /// A file line has no `:` between path and line number.
    #[error("line {line_no}: file line has no ':' separator: {line:?}")]
    MissingColon {
        /// 1-based line number within the dump.
        line_no: usize,
        /// Offending line.
        line: String,
    },

    /// A file line carries a missing, non-numeric or zero line number.
    #[error("line {line_no}: invalid line number in {line:?}")]
    BadLineNumber {
        /// 1-based line number within the dump.
        line_no: usize,
        /// Offending line.
        line: String,
    },

    /// The dump holds no frame pairs.
    #[error("stack dump contains no frames")]
    NoFrames,

    /// More frames were skipped than the dump holds.
    #[error("cannot skip {requested} frame(s) of a {available}-frame stack")]
    BadSkipFrames {
        /// Frames the caller asked to skip.
        requested: usize,
        /// Frame pairs present in the dump.
        available: usize,
    },
}

// ─── Frame ──────────────────────────────────────────────────────────

/// One call-site record of a captured stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Frame {
    function: String,
    file: String,
    line: u32,
    args: String,
}

impl Frame {
    /// Build a frame from its parts.
    pub fn new(
        function: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        args: impl Into<String>,
    ) -> Self {
        Self {
            function: function.into(),
            file: file.into(),
            line,
            args: args.into(),
        }
    }

    /// Fully qualified function name.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Source file path.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Source line number (always >= 1 for parsed frames).
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Raw call-argument text, without the surrounding parentheses.
    pub fn args(&self) -> &str {
        &self.args
    }

    /// `file:line` of this frame.
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.function, self.file, self.line)
    }
}

// ─── StackModel ─────────────────────────────────────────────────────

/// An immutable, never-empty sequence of frames (innermost first) plus the
/// metadata of the thread it was taken on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackModel {
    thread_id: u64,
    status: String,
    is_main: bool,
    frames: Vec<Frame>,
    creator: Option<Frame>,
}

assert_impl_all!(StackModel: Send, Sync);
assert_impl_all!(Frame: Send, Sync);

impl StackModel {
    /// Parse one raw stack dump, discarding `skip_frames` innermost frames.
    ///
    /// # Errors
    ///
    /// Returns a [`CaptureError`] when the text deviates from the grammar,
    /// or when skipping would leave no frame behind.
    pub fn parse(text: &str, skip_frames: usize) -> Result<Self, CaptureError> {
        let mut lines: Vec<&str> = text.lines().collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        let Some(header) = lines.first() else {
            return Err(CaptureError::Empty);
        };

        let captures = HEADER_RE
            .captures(header)
            .ok_or_else(|| CaptureError::BadHeader {
                line: header.to_string(),
            })?;
        let thread_id = captures[1]
            .parse::<u64>()
            .map_err(|_| CaptureError::BadHeader {
                line: header.to_string(),
            })?;
        let status = captures[2].to_string();

        let has_creator = lines.len() >= HEADER_LINES + CREATOR_LINES
            && lines[lines.len() - 2].starts_with(CREATOR_PREFIX);
        let trailer = if has_creator { CREATOR_LINES } else { 0 };

        let available = lines.len().saturating_sub(HEADER_LINES + trailer) / 2;
        if available == 0 {
            return Err(CaptureError::NoFrames);
        }
        if skip_frames >= available {
            return Err(CaptureError::BadSkipFrames {
                requested: skip_frames,
                available,
            });
        }

        let mut frames = Vec::with_capacity(available - skip_frames);
        for pair in skip_frames..available {
            let index = HEADER_LINES + pair * 2;
            frames.push(parse_frame(lines[index], index + 1, lines[index + 1])?);
        }

        let creator = if has_creator {
            let index = lines.len() - 2;
            let function = lines[index]
                .strip_prefix(CREATOR_PREFIX)
                .unwrap_or(lines[index]);
            Some(parse_frame(function, index + 1, lines[index + 1])?)
        } else {
            None
        };

        Ok(Self {
            thread_id,
            status,
            is_main: !has_creator,
            frames,
            creator,
        })
    }

    /// Identifier of the thread the stack was taken on.
    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Thread status text from the dump header.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// True for the process entry thread (the dump had no creator block).
    pub fn is_main(&self) -> bool {
        self.is_main
    }

    /// Frames, innermost first. Never empty.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The site that started this thread, if known.
    pub fn creator(&self) -> Option<&Frame> {
        self.creator.as_ref()
    }

    /// The innermost frame: where the stack was captured.
    pub fn origin(&self) -> &Frame {
        &self.frames[0]
    }
}

/// Renders the stack back into the dump grammar (offsets are not kept).
impl fmt::Display for StackModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "thread {} [{}]:", self.thread_id, self.status)?;
        for frame in &self.frames {
            writeln!(f, "{}({})", frame.function, frame.args)?;
            writeln!(f, "\t{}:{}", frame.file, frame.line)?;
        }
        if let Some(creator) = &self.creator {
            writeln!(f, "{CREATOR_PREFIX}{}", creator.function)?;
            writeln!(f, "\t{}:{}", creator.file, creator.line)?;
        }
        Ok(())
    }
}

// ─── Line grammar ───────────────────────────────────────────────────

fn parse_frame(
    signature: &str,
    signature_line_no: usize,
    file_line: &str,
) -> Result<Frame, CaptureError> {
    let (function, args) = split_signature(signature);
    let (file, line) = parse_file_line(signature_line_no + 1, file_line)?;
    Ok(Frame {
        function: function.to_string(),
        file: file.to_string(),
        line,
        args: args.to_string(),
    })
}

/// Split `name(args)` at the name/argument boundary.
///
/// A `(` directly after `.` opens a receiver type such as
/// `pkg.(*Type).Method(args)`; the boundary is then the next `(`.
fn split_signature(signature: &str) -> (&str, &str) {
    let Some(mut open) = signature.find('(') else {
        return (signature, "");
    };
    if open > 0 && signature.as_bytes()[open - 1] == b'.' {
        match signature[open + 1..].find('(') {
            Some(next) => open += 1 + next,
            None => return (signature, ""),
        }
    }
    let rest = &signature[open + 1..];
    let args = match rest.rfind(')') {
        Some(close) => &rest[..close],
        None => rest,
    };
    (&signature[..open], args)
}

/// Parse `\t<file>:<line> +<offset>`. The line number sits between the
/// last `:` and the last space.
fn parse_file_line(line_no: usize, line: &str) -> Result<(&str, u32), CaptureError> {
    let Some(body) = line.strip_prefix('\t') else {
        return Err(CaptureError::MissingTab {
            line_no,
            line: line.to_string(),
        });
    };
    let colon = body.rfind(':').ok_or_else(|| CaptureError::MissingColon {
        line_no,
        line: line.to_string(),
    })?;
    let end = match body.rfind(' ') {
        Some(space) if space > colon => space,
        _ => body.len(),
    };
    match body[colon + 1..end].parse::<u32>() {
        Ok(number) if number >= 1 => Ok((&body[..colon], number)),
        _ => Err(CaptureError::BadLineNumber {
            line_no,
            line: line.to_string(),
        }),
    }
}

// ─── Capture ────────────────────────────────────────────────────────

/// Capture the current thread's stack from the runtime.
///
/// # Panics
///
/// Panics if the runtime's dump does not parse, or if `skip_frames` would
/// leave no frame. Both mean the platform and this crate disagree.
#[track_caller]
pub fn capture(skip_frames: usize) -> StackModel {
    capture_from(&RuntimeStackSource, skip_frames)
}

/// Like [`capture`], but returns the parse error instead of panicking.
///
/// # Errors
///
/// See [`StackModel::parse`].
#[track_caller]
pub fn try_capture(skip_frames: usize) -> Result<StackModel, CaptureError> {
    let raw = RuntimeStackSource.dump(Location::caller());
    StackModel::parse(&raw, skip_frames)
}

/// Capture a stack from an explicit [`StackSource`].
///
/// # Panics
///
/// See [`capture`].
#[track_caller]
pub fn capture_from<S: StackSource + ?Sized>(source: &S, skip_frames: usize) -> StackModel {
    let raw = source.dump(Location::caller());
    match StackModel::parse(&raw, skip_frames) {
        Ok(stack) => {
            debug!(
                thread = stack.thread_id(),
                frames = stack.frames().len(),
                "captured stack"
            );
            stack
        }
        Err(err) => {
            error!(%err, skip_frames, "stack dump does not match the expected grammar");
            panic!("faultline: unparseable stack dump: {err}");
        }
    }
}
