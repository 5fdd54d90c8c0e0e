#![allow(dead_code)]

use std::sync::Once;

/// Initialises the test logger exactly once, same as the teacher crate's
/// integration-test harness (`tests/util/mod.rs`).
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::try_init();
    });
}
