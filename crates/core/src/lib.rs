//! Domain layer for the VQA annotation service.
//!
//! Pure types and functions shared by the store, mirror and API crates:
//!
//! - [`record`] - the annotation record persisted in the partition files.
//! - [`sheet`] - the remote review sheet row model and row patches.
//! - [`status`] - workflow status derivation from sheet rows.
//! - [`catalog`] - read-only image lookup.
//! - [`assignment`] - worker assignment bookkeeping.
//! - [`export`] - conversion of reviewed rows back into records.

pub mod assignment;
pub mod catalog;
pub mod error;
pub mod export;
pub mod record;
pub mod sheet;
pub mod status;
pub mod types;
