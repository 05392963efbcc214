//! Shared test utilities: tracing bootstrap.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ...
//! }
//! ```
//!
//! Filter with `RUST_LOG`, e.g. `RUST_LOG=triplex=trace`. Without the
//! crate's `tracing` feature the core stays silent; the subscriber
//! still catches the tests' own events.

#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize the tracing subscriber once per test binary.
///
/// Safe to call from every test; only the first call takes effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
