//! End-to-end behaviour of capture, traversal and formatting on
//! hand-built error graphs.

use faultline::chain::{NodeId, enumerate_chains};
use faultline::prelude::*;
use std::error::Error;
use std::fmt;
use std::io;

const WORKER_DUMP: &str = "thread 17 [running]:
app.decode(0x1, 0x2)
\t/src/app/decode.rs:88 +0x1f
app.(*Reader).Next(0xc0000a0000)
\t/src/app/reader.rs:41 +0x6c
app.pump()
\t/src/app/pump.rs:12 +0x25
created by app.spawn_pumps
\t/src/app/main.rs:30 +0x3c
";

const STACK_B: &str = "thread 1 [running]:
app.store(...)
\t/src/app/b.rs:21 +0x10
app.main()
\t/src/app/main.rs:5 +0x20
";

fn rt_formatter() -> Formatter {
    Formatter::new(PanicDetector::new(PanicMarkers::new(
        "rt.unwind",
        "rt.unwind",
        ["rt."],
    )))
}

/// Foreign wrapper that adds context without capturing a stack.
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
fn test_frame_count_follows_line_count() {
    let total = WORKER_DUMP.lines().count();
    let (header, trailer) = (1, 2);
    for skip in 0..3 {
        let stack = StackModel::parse(WORKER_DUMP, skip).unwrap();
        assert_eq!(stack.frames().len(), (total - header - trailer) / 2 - skip);
    }
}

#[test]
fn test_enumerate_chains_starts_with_root() {
    assert!(enumerate_chains(None).is_empty());

    let err = RichError::associate(
        RichError::with_stack(io::Error::other("primary"), StackModel::parse(STACK_B, 0).unwrap()),
        io::Error::other("secondary"),
    );
    let chains = enumerate_chains(Some(&err));
    assert_eq!(chains[0].head().id(), NodeId::of(&err));
}

#[test]
fn test_dump_types_ignores_side_edges() {
    let join = RichError::join([
        SharedError::new(io::Error::other("first")),
        SharedError::new(RichError::new("second")),
    ])
    .unwrap();
    let err = RichError::associate(join, RichError::new("aside"));

    let types = dump_types(Some(&err));
    assert_eq!(types.len(), 3);
    assert!(!types.iter().any(|t| t == "faultline::RichError(message)"));
}

#[test]
fn test_collect_stacks_finds_the_only_stack() {
    let stack = StackModel::parse(STACK_B, 0).unwrap();
    let mut err = SharedError::new(RichError::with_stack(io::Error::other("io"), stack.clone()));
    for depth in 0..4 {
        err = SharedError::new(RichError::with_key_value(err, "depth", depth.to_string()));
    }

    let stacks = collect_stacks(Some(err.as_error()));
    assert_eq!(stacks, vec![&stack]);
    let mut newest_first = stacks.clone();
    newest_first.reverse();
    assert_eq!(newest_first, vec![&stack]);
}

#[test]
fn test_first_panic_stack_without_fault() {
    let older = RichError::with_stack(io::Error::other("io"), StackModel::parse(STACK_B, 0).unwrap());
    let newer = RichError::with_stack(older, StackModel::parse(WORKER_DUMP, 0).unwrap());

    let found = first_panic_stack(Some(&newer), rt_formatter().detector()).unwrap();
    assert!(!found.is_panic());
    assert_eq!(found.stack.origin().function(), "app.store");
    assert_eq!(found.owner.type_name(), "faultline::RichError(stack)");
}

#[test]
fn test_none_formats_as_ok() {
    for format in Format::ALL {
        assert_eq!(rt_formatter().render(None, format), "OK");
    }
}

#[test]
fn test_default_format_of_plain_error() {
    let err = io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded");
    assert_eq!(format(Some(&err), Format::Default), err.to_string());
}

#[test]
fn test_join_scenario() {
    let err_a = io::Error::other("base");
    let err_b = RichError::with_stack(err_a, StackModel::parse(STACK_B, 0).unwrap());
    let err_c = RichError::join([
        SharedError::new(err_b),
        SharedError::new(io::Error::other("side")),
    ])
    .unwrap();

    let chains = enumerate_chains(Some(&err_c));
    assert_eq!(chains.len(), 2);
    let own: Vec<String> = chains[0].nodes().iter().map(|l| l.error().to_string()).collect();
    assert_eq!(own, vec!["base", "base", "base; side"]);
    assert_eq!(chains[1].head().error().to_string(), "side");

    assert_eq!(
        rt_formatter().render(Some(&err_c), Format::Short),
        format!("{err_c} at /src/app/b.rs:21")
    );
}

#[test]
fn test_triple_wrap_without_stack() {
    let mut err: Box<dyn Error + Send + Sync> = Box::new(io::Error::other("base"));
    for message in ["parse", "load", "start"] {
        err = Box::new(Context {
            message,
            source: err,
        });
    }
    let node: &(dyn Error + 'static) = err.as_ref();
    assert_eq!(format(Some(node), Format::CodeLocation), node.to_string());
    assert_eq!(node.to_string(), "start: load: parse: base");
}

#[test]
fn test_captured_error_reports_this_file() {
    let err = RichError::new("bad input");
    let line = format(Some(&err), Format::CodeLocation);
    assert!(line.starts_with("bad input at "), "{line}");
    assert!(line.contains("scenarios.rs:"), "{line}");
}

#[test]
fn test_errors_cross_threads() {
    let err = SharedError::new(RichError::wrap(io::Error::other("refused"), "connecting"));
    let rendered = std::thread::spawn({
        let err = err.clone();
        move || format(Some(err.as_error()), Format::Short)
    })
    .join()
    .unwrap();
    assert_eq!(rendered, format(Some(err.as_error()), Format::Short));
}
