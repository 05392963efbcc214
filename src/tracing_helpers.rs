//! Zero-cost tracing helpers.
//!
//! When the `tracing` feature is enabled, these macros forward to the
//! `tracing` crate. When disabled (default), they compile to no-ops with
//! zero runtime overhead. They are used on rare structural paths only:
//! splits, root replacement, CAS restarts, rebalancing.
//!
//! ```bash
//! # Normal build - no tracing overhead
//! cargo build --release
//!
//! # Run a test with structural events logged
//! RUST_LOG=triplex=trace cargo test --features tracing
//! ```

#![allow(unused_macros, unused_imports)]

/// Trace-level logging (most verbose). Compiles to no-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        // Completely empty - zero cost
    };
}

/// Debug-level logging. Compiles to no-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use trace_log;
