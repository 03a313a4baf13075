//! Raw stack dumps from the Rust runtime.
//!
//! The standard library exposes a captured [`Backtrace`] only as text, so
//! [`RuntimeStackSource`] reads that text and re-emits it in the dump
//! grammar understood by [`StackModel::parse`](super::StackModel::parse).

use regex::Regex;
use std::backtrace::Backtrace;
use std::fmt::Write as _;
use std::panic::Location;
use std::sync::LazyLock;
use std::thread;

static SYMBOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+: (.+)$")
        .expect("backtrace symbol: pattern is valid and should always compile")
});

static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+at (.+?):(\d+)(?::\d+)?$")
        .expect("backtrace location: pattern is valid and should always compile")
});

static HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"::h[0-9a-f]{16}$")
        .expect("symbol hash: pattern is valid and should always compile")
});

/// Leading frames that belong to the capture machinery, not to the caller.
const CAPTURE_FRAME_PREFIXES: &[&str] = &[
    "std::backtrace",
    "backtrace::",
    "faultline::stack::",
    "faultline::error::RichError::",
    "faultline::error::ResultExt",
    "faultline::format::Format",
    "faultline::panic::",
    // The panic hook runs through `<Box<dyn Fn> as Fn>::call`.
    "alloc::boxed::Box<",
];

/// Produces one raw stack dump for the current thread.
///
/// This is the seam to the hosting runtime: anything that can describe the
/// current call stack in the dump grammar can stand in for the runtime.
pub trait StackSource {
    /// Return the dump text. `caller` is the location that asked for the
    /// capture, for sources that cannot resolve frames on their own.
    fn dump(&self, caller: &'static Location<'static>) -> String;
}

/// [`StackSource`] backed by [`std::backtrace::Backtrace`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeStackSource;

impl StackSource for RuntimeStackSource {
    fn dump(&self, caller: &'static Location<'static>) -> String {
        let backtrace = Backtrace::force_capture();
        let current = thread::current();
        render_dump(
            &backtrace.to_string(),
            thread_number(current.id()),
            current.name() == Some("main"),
            caller,
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
struct RawFrame {
    function: String,
    file: String,
    line: u32,
}

/// Turn `std`'s backtrace text into the dump grammar.
fn render_dump(
    backtrace: &str,
    thread_id: u64,
    is_main: bool,
    caller: &'static Location<'static>,
) -> String {
    let mut frames = read_frames(backtrace);
    let internal = frames
        .iter()
        .take_while(|frame| is_capture_frame(&frame.function))
        .count();
    frames.drain(..internal);

    if frames.is_empty() {
        frames.push(RawFrame {
            function: "<unresolved>".to_string(),
            file: caller.file().to_string(),
            line: caller.line().max(1),
        });
    }

    let mut out = format!("thread {thread_id} [running]:\n");
    for frame in &frames {
        let _ = writeln!(out, "{}()\n\t{}:{} +0x0", frame.function, frame.file, frame.line);
    }
    if !is_main {
        if let Some(outermost) = frames.last() {
            let _ = writeln!(
                out,
                "created by {}\n\t{}:{} +0x0",
                outermost.function, outermost.file, outermost.line
            );
        }
    }
    out
}

/// Collect frames that carry a file and line; unresolved frames are dropped.
fn read_frames(backtrace: &str) -> Vec<RawFrame> {
    let mut frames = Vec::new();
    let mut pending: Option<String> = None;
    for line in backtrace.lines() {
        if let Some(location) = LOCATION_RE.captures(line) {
            let Some(function) = pending.take() else {
                continue;
            };
            let Ok(number) = location[2].parse::<u32>() else {
                continue;
            };
            if number == 0 {
                continue;
            }
            frames.push(RawFrame {
                function,
                file: location[1].to_string(),
                line: number,
            });
        } else if let Some(symbol) = SYMBOL_RE.captures(line) {
            pending = Some(clean_symbol(&symbol[1]));
        }
    }
    frames
}

/// Strip the mangling hash and keep parentheses out of the symbol, so the
/// name/argument boundary of the dump grammar stays unambiguous.
fn clean_symbol(symbol: &str) -> String {
    HASH_RE
        .replace(symbol.trim(), "")
        .replace('(', "[")
        .replace(')', "]")
}

/// Matches both plain paths and trait impls (`<T as faultline::...>::f`).
fn is_capture_frame(function: &str) -> bool {
    let function = function.trim_start_matches('<');
    let trait_path = function.split_once(" as ").map(|(_, path)| path);
    CAPTURE_FRAME_PREFIXES.iter().any(|prefix| {
        function.starts_with(prefix) || trait_path.is_some_and(|path| path.starts_with(prefix))
    })
}

/// `ThreadId` only exposes its number through `Debug` (`ThreadId(7)`).
fn thread_number(id: thread::ThreadId) -> u64 {
    let debug = format!("{id:?}");
    debug
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}
