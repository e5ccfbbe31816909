//! Core library for the ballistic-tools command line application.
//!
//! Ballistic test workbooks are extracted into a single JSON store, selected
//! into a version-consistent workplace, and reduced to per-time-point
//! statistics. IO adapters live under [`io`], data representations inside
//! [`model`], the sheet extraction logic in [`extract`], and the file-level
//! orchestration under [`database`].

pub mod aggregate;
pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod io;
pub mod model;
pub mod normalize;
pub mod store;
pub mod versions;
pub mod workplace;

pub use error::{Result, ToolError};
