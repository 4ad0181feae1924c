//! electro-viewer: entity schema extraction and key reconstruction.
//!
//! Loads user-authored entity definitions, normalizes them into a canonical
//! schema, persists that schema as a JSON cache, and rebuilds the exact
//! partition/sort key strings the modeling library writes.

pub mod cli;
pub mod core;
pub mod loader;
pub mod watch;
