//! Module for reading and writing models and abundance tables
pub mod json;
