//! Printable renderings of an error graph.
//!
//! | format         | output                                                     |
//! |----------------|------------------------------------------------------------|
//! | `Default`      | the message                                                |
//! | `CodeLocation` | message `at file:line`, when the causal chain has a stack  |
//! | `Short`        | `CodeLocation`, then ` N[...]` listing the other chains    |
//! | `Long`         | `CodeLocation`, then one block per node of every chain     |
//! | `LongSuffix`   | `Long` without its first line                              |
//!
//! The reported location is the site of the oldest panic on the causal
//! chain, or else the creation site of the oldest stack on it.

use crate::chain::{Edge, Link, enumerate_links, first_panic_link};
use crate::detect::PanicDetector;
use crate::error::RichError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::error;

/// Rendering of an absent error.
pub const OK: &str = "OK";

/// Output format. Codes are `0..=4` in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// The message only.
    #[default]
    Default,
    /// The message and where it happened.
    #[serde(rename = "location", alias = "code-location")]
    CodeLocation,
    /// One line covering every chain.
    Short,
    /// Multi-line, with stacks and annotations.
    Long,
    /// `Long` without the leading message.
    LongSuffix,
}

impl Format {
    /// All formats, in code order.
    pub const ALL: [Format; 5] = [
        Format::Default,
        Format::CodeLocation,
        Format::Short,
        Format::Long,
        Format::LongSuffix,
    ];

    /// Numeric code of this format.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Name accepted by [`FromStr`].
    pub const fn as_str(self) -> &'static str {
        match self {
            Format::Default => "default",
            Format::CodeLocation => "location",
            Format::Short => "short",
            Format::Long => "long",
            Format::LongSuffix => "long-suffix",
        }
    }

    /// Look up a format by numeric code.
    ///
    /// # Errors
    ///
    /// An unknown code is a programming error; the returned error carries
    /// a stack captured at the caller.
    #[track_caller]
    pub fn from_code(code: u8) -> Result<Format, RichError> {
        match Self::ALL.get(usize::from(code)) {
            Some(&format) => Ok(format),
            None => Err(RichError::new(format!("unknown format code {code}"))),
        }
    }
}

/// Error returned when parsing a format name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown format name {0:?}")]
pub struct UnknownFormat(pub String);

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

// ─── Formatter ──────────────────────────────────────────────────────

/// Renders error graphs, using its detector to find panic sites.
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    detector: PanicDetector,
}

static DEFAULT_FORMATTER: LazyLock<Formatter> = LazyLock::new(Formatter::default);

/// Render `root` with the default panic markers.
pub fn format(root: Option<&(dyn Error + 'static)>, format: Format) -> String {
    DEFAULT_FORMATTER.render(root, format)
}

impl Formatter {
    /// Create a formatter using `detector`.
    pub fn new(detector: PanicDetector) -> Self {
        Self { detector }
    }

    /// The detector in use.
    pub fn detector(&self) -> &PanicDetector {
        &self.detector
    }

    /// Render `root` in `format`. `None` renders as [`OK`].
    pub fn render(&self, root: Option<&(dyn Error + 'static)>, format: Format) -> String {
        let Some(root) = root else {
            return OK.to_string();
        };
        let root = Link::new(root);
        match format {
            Format::Default => root.error().to_string(),
            Format::CodeLocation => self.code_location(root),
            Format::Short => self.short(root),
            Format::Long => self.long(root, true),
            Format::LongSuffix => self.long(root, false),
        }
    }

    /// Render `root` in the format with numeric `code`.
    ///
    /// # Panics
    ///
    /// Panics on an unknown code, with the long rendering of the fault.
    #[track_caller]
    pub fn render_code(&self, root: Option<&(dyn Error + 'static)>, code: u8) -> String {
        match Format::from_code(code) {
            Ok(format) => self.render(root, format),
            Err(fault) => {
                error!(code, "unknown format code");
                panic!("{}", self.render(Some(&fault), Format::Long));
            }
        }
    }

    /// `file:line` reported for `root`, if its causal chain has a stack.
    pub fn location(&self, root: Option<&(dyn Error + 'static)>) -> Option<String> {
        root.and_then(|root| self.location_of(Link::new(root)))
    }

    fn location_of(&self, link: Link<'_>) -> Option<String> {
        first_panic_link(link, &self.detector).map(|found| found.location_frame().location())
    }

    fn code_location(&self, link: Link<'_>) -> String {
        let message = link.error().to_string();
        match self.location_of(link) {
            Some(location) => format!("{message} at {location}"),
            None => message,
        }
    }

    fn short(&self, root: Link<'_>) -> String {
        let mut out = self.code_location(root);

        // Joined siblings are part of the join's own message.
        let extra: Vec<String> = enumerate_links(root)
            .iter()
            .skip(1)
            .filter(|chain| chain.edge() != Edge::Joined)
            .map(|chain| self.code_location(chain.head()))
            .collect();

        if !extra.is_empty() {
            let _ = write!(out, " {}[{}]", extra.len(), extra.join(", "));
        }
        out
    }

    fn long(&self, root: Link<'_>, with_message: bool) -> String {
        let mut lines = Vec::new();
        if with_message {
            lines.push(self.code_location(root));
        }

        for (index, chain) in enumerate_links(root).iter().enumerate() {
            for (depth, link) in chain.newest_first().enumerate() {
                let is_root = index == 0 && depth == 0;
                match link.rich() {
                    Some(rich) => self.rich_block(&mut lines, link, rich, is_root),
                    None if is_root => {}
                    None if index == 0 || depth == 0 => {
                        lines.push(format!("{} [{}]", link.error(), link.type_name()));
                    }
                    None => {}
                }
            }
        }
        lines.join("\n")
    }

    fn rich_block(
        &self,
        lines: &mut Vec<String>,
        link: Link<'_>,
        rich: &RichError,
        is_root: bool,
    ) {
        if !is_root {
            lines.push(format!("{} [{}]", link.error(), link.type_name()));
        }
        if let Some(stack) = rich.stack() {
            let panic_index = self.detector.indices(stack).map(|site| site.panic_index);
            for (i, frame) in stack.frames().iter().enumerate() {
                let marker = if panic_index == Some(i) { " (panic)" } else { "" };
                lines.push(format!("    {}{marker}", frame.function()));
                lines.push(format!("        {}", frame.location()));
            }
        }
        if let Some((key, value)) = rich.key_value() {
            lines.push(format!("    {key}={value}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::PanicMarkers;
    use crate::error::SharedError;
    use crate::stack::StackModel;
    use std::fmt;
    use std::io;

    fn stack(function: &str, line: u32) -> StackModel {
        let dump = format!(
            "thread 1 [running]:\n\
             {function}(0x1)\n\t/src/{function}.rs:{line} +0x0\n\
             app.main()\n\t/src/main.rs:3 +0x0\n"
        );
        StackModel::parse(&dump, 0).unwrap()
    }

    /// Foreign wrapper that adds context without a stack.
    #[derive(Debug)]
    struct Context {
        message: &'static str,
        source: Box<dyn Error + Send + Sync>,
    }

    impl fmt::Display for Context {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}: {}", self.message, self.source)
        }
    }

    impl Error for Context {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(self.source.as_ref())
        }
    }

    #[test]
    fn test_none_is_ok_in_every_format() {
        for format in Format::ALL {
            assert_eq!(super::format(None, format), OK);
        }
    }

    #[test]
    fn test_default_is_the_message() {
        let plain = io::Error::other("refused");
        assert_eq!(super::format(Some(&plain), Format::Default), "refused");
    }

    #[test]
    fn test_code_location_uses_oldest_stack() {
        let inner = RichError::with_stack(io::Error::other("disk full"), stack("app.write", 40));
        let outer = RichError::with_stack(inner, stack("app.save", 12));
        assert_eq!(
            super::format(Some(&outer), Format::CodeLocation),
            "disk full at /src/app.write.rs:40"
        );
        assert_eq!(
            Formatter::default().location(Some(&outer)).as_deref(),
            Some("/src/app.write.rs:40")
        );
    }

    #[test]
    fn test_code_location_without_any_stack() {
        let mut err: Box<dyn Error + Send + Sync> = Box::new(io::Error::other("base"));
        for message in ["one", "two", "three"] {
            err = Box::new(Context {
                message,
                source: err,
            });
        }
        assert_eq!(
            super::format(Some(err.as_ref()), Format::CodeLocation),
            "three: two: one: base"
        );
    }

    #[test]
    fn test_code_location_prefers_panic_site() {
        let unwound = StackModel::parse(
            "thread 1 [running]:
app.recover()
\t/src/guard.rs:20 +0x0
rt.unwind()
\t/rt/unwind.rs:800 +0x0
app.lookup()
\t/src/lookup.rs:57 +0x0
",
            0,
        )
        .unwrap();
        let err = RichError::with_stack(io::Error::other("index out of range"), unwound);
        let rt = Formatter::new(PanicDetector::new(PanicMarkers::new(
            "rt.unwind",
            "rt.unwind",
            ["rt."],
        )));

        assert_eq!(
            rt.render(Some(&err), Format::CodeLocation),
            "index out of range at /src/lookup.rs:57"
        );
        assert_eq!(
            Formatter::default().render(Some(&err), Format::CodeLocation),
            "index out of range at /src/guard.rs:20"
        );
    }

    #[test]
    fn test_short_lists_associated_chains() {
        let err = RichError::associate(
            RichError::with_stack(io::Error::other("write failed"), stack("app.write", 9)),
            RichError::with_stack(io::Error::other("unlink failed"), stack("app.cleanup", 31)),
        );
        assert_eq!(
            super::format(Some(&err), Format::Short),
            "write failed at /src/app.write.rs:9 1[unlink failed at /src/app.cleanup.rs:31]"
        );
    }

    #[test]
    fn test_short_skips_joined_siblings() {
        let err = RichError::join([
            SharedError::new(RichError::with_stack(io::Error::other("a"), stack("app.a", 1))),
            SharedError::new(io::Error::other("b")),
        ])
        .unwrap();
        assert_eq!(super::format(Some(&err), Format::Short), "a; b at /src/app.a.rs:1");
    }

    #[test]
    fn test_short_keeps_associated_text_found_in_root() {
        let err = RichError::associate(io::Error::other("write failed"), io::Error::other("failed"));
        assert_eq!(super::format(Some(&err), Format::Short), "write failed 1[failed]");
    }

    #[test]
    fn test_long_layout() {
        let stacked = RichError::with_stack(io::Error::other("disk full"), stack("app.write", 7));
        let err = RichError::with_key_value(stacked, "path", "/tmp/out");

        let expected = "\
disk full at /src/app.write.rs:7
    path=/tmp/out
disk full [faultline::RichError(stack)]
    app.write
        /src/app.write.rs:7
    app.main
        /src/main.rs:3
disk full [std::io::error::Error]";
        assert_eq!(super::format(Some(&err), Format::Long), expected);

        let suffix = super::format(Some(&err), Format::LongSuffix);
        assert_eq!(suffix, expected.split_once('\n').unwrap().1);
    }

    #[test]
    fn test_long_shows_only_heads_of_later_chains() {
        let side = Context {
            message: "cleanup",
            source: Box::new(io::Error::other("unlink")),
        };
        let err = RichError::associate(io::Error::other("write"), side);

        let lines: Vec<String> = super::format(Some(&err), Format::Long)
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "write".to_string(),
                "write [std::io::error::Error]".to_string(),
                "cleanup: unlink [faultline::format::tests::Context]".to_string(),
            ]
        );
    }

    #[test]
    fn test_long_marks_panic_frame() {
        let unwound = StackModel::parse(
            "thread 1 [running]:
rt.unwind()
\t/rt/unwind.rs:800 +0x0
app.lookup()
\t/src/lookup.rs:57 +0x0
",
            0,
        )
        .unwrap();
        let err = RichError::from_panic("boom", unwound);
        let rt = Formatter::new(PanicDetector::new(PanicMarkers::new(
            "rt.unwind",
            "rt.unwind",
            ["rt."],
        )));
        let long = rt.render(Some(&err), Format::Long);
        assert!(long.starts_with("panic: boom at /src/lookup.rs:57\n"));
        assert!(long.contains("    app.lookup (panic)\n"));
    }

    #[test]
    fn test_format_codes() {
        for format in Format::ALL {
            assert_eq!(Format::from_code(format.code()).unwrap(), format);
            assert_eq!(format.as_str().parse::<Format>().unwrap(), format);
        }
        let fault = Format::from_code(5).unwrap_err();
        assert_eq!(fault.to_string(), "unknown format code 5");
        assert!(fault.stack().unwrap().origin().file().ends_with("format.rs"));
        assert!("verbose".parse::<Format>().is_err());
    }

    #[test]
    fn test_render_code_known() {
        let plain = io::Error::other("x");
        assert_eq!(Formatter::default().render_code(Some(&plain), 0), "x");
    }

    #[test]
    #[should_panic(expected = "unknown format code 9")]
    fn test_render_code_unknown_is_fatal() {
        Formatter::default().render_code(None, 9);
    }

    #[test]
    fn test_format_serde_names() {
        #[derive(Debug, Deserialize)]
        struct Wrapper {
            format: Format,
        }
        let parsed: Wrapper = toml::from_str("format = \"long-suffix\"").unwrap();
        assert_eq!(parsed.format, Format::LongSuffix);
        let parsed: Wrapper = toml::from_str("format = \"location\"").unwrap();
        assert_eq!(parsed.format, Format::CodeLocation);
    }
}
