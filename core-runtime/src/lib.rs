//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the channel archive engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Progress hub (live status fan-out and snapshot)
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions and the event shapes observers see.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::ArchiveConfig;
pub use error::{Error, Result};
pub use events::{ArchiveEvent, ProgressHub, ProgressSnapshot};
