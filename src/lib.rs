//! Workspace placeholder crate.
//!
//! This crate re-exports the archive service so host applications can depend
//! on `channel-archive-workspace` alone instead of wiring each workspace crate
//! (`core-service`, `core-sync`, `core-runtime`) individually.

pub use core_service::*;
