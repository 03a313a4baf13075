//! Panics caught with the capturing hook installed.

use faultline::panic::{catch, install_hook};
use faultline::prelude::*;

#[inline(never)]
fn lookup(values: &[u32], index: usize) -> u32 {
    if index >= values.len() {
        panic!("index {index} out of range");
    }
    values[index]
}

#[test]
fn test_hooked_panic_is_detected() {
    install_hook();
    install_hook();

    let err = catch(|| lookup(&[1, 2, 3], 7)).unwrap_err();
    assert_eq!(err.kind(), RichKind::Panic);
    assert_eq!(err.to_string(), "panic: index 7 out of range");

    let stack = err.stack().expect("panic errors carry a stack");
    let site = PanicDetector::default()
        .indices(stack)
        .expect("stack recorded by the hook is a panic");
    let frame = &stack.frames()[site.panic_index];
    assert!(frame.function().ends_with("lookup"), "{frame}");

    let location = format(Some(&err), Format::CodeLocation);
    assert!(location.contains("panic_capture.rs:"), "{location}");
}

#[test]
fn test_catch_without_panic() {
    install_hook();
    assert_eq!(catch(|| lookup(&[4, 5], 1)).unwrap(), 5);
}

#[test]
fn test_panics_on_other_threads_are_caught_there() {
    install_hook();
    let handle = std::thread::spawn(|| catch(|| lookup(&[], 0)).map_err(|e| e.to_string()));
    let result = handle.join().unwrap();
    assert_eq!(result, Err("panic: index 0 out of range".to_string()));
}
