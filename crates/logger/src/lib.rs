//! Tracing bootstrap shared by the BUMP binaries.

mod tracing;

pub use self::tracing::{LogGuard, init, init_with};
