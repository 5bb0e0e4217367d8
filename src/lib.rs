//! obs-overlay: ticker, header and name-tag relay for OBS overlays.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod clock;
pub mod config;
pub mod market;
pub mod overlay;
pub mod panel;
pub mod state;
pub mod storage;
pub mod sync;
pub mod types;
