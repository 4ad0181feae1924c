//! Core engine: schema extraction, cache, and key reconstruction.

pub mod cache;
pub mod error;
pub mod keys;
pub mod lookup;
pub mod normalizer;
pub mod parser;
pub mod rebuild;
pub mod resolver;
pub mod types;
pub mod validate;
