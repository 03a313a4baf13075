//! Configuration file loading tests.

use faultline::config::{ConfigError, ConfigLoader, FaultlineConfig, LogLevel};
use faultline::detect::PanicDetector;
use faultline::format::{Format, Formatter};
use faultline::stack::StackModel;
use faultline::error::RichError;
use std::fs;
use tempfile::TempDir;

const RT_CONFIG: &str = r#"
log_level = "debug"
format = "location"

[markers]
deferred_invokers = ["rt.unwind"]
fault_entries = ["rt.unwind"]
internal_prefixes = ["rt."]
"#;

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("faultline.toml");
    fs::write(&path, RT_CONFIG).unwrap();

    let config = FaultlineConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.format, Format::CodeLocation);
    assert_eq!(config.markers.deferred_invokers, vec!["rt.unwind"]);
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = FaultlineConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

#[test]
fn test_invalid_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "format = [").unwrap();
    assert!(matches!(
        FaultlineConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_unknown_format_name_is_rejected() {
    let result = FaultlineConfig::from_toml(r#"format = "verbose""#);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_loaded_markers_drive_the_formatter() {
    let config = FaultlineConfig::from_toml(RT_CONFIG).unwrap();
    let formatter = Formatter::new(PanicDetector::new(config.markers));

    let unwound = StackModel::parse(
        "thread 1 [running]:
app.recover()
\t/src/guard.rs:20 +0x0
rt.unwind()
\t/rt/unwind.rs:800 +0x0
rt.bounds()
\t/rt/bounds.rs:12 +0x0
app.lookup()
\t/src/lookup.rs:57 +0x0
",
        0,
    )
    .unwrap();
    let err = RichError::from_panic("index out of range", unwound);
    assert_eq!(
        formatter.render(Some(&err), config.format),
        "panic: index out of range at /src/lookup.rs:57"
    );
}
