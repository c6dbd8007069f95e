//! BUMP - website availability monitoring engine.
//!
//! Monitors run HTTP checks against their target on a fixed period, record
//! every result to an append-only history, and raise alerts when a monitor
//! changes between up and down. A user-facing shell drives the engine through
//! [`control::MonitorControl`].

pub mod alerts;
pub mod config;
pub mod control;
pub mod error;
pub mod lock;
pub mod monitoring;
pub mod orchestrator;
