//! Storage module for fleet
//!
//! - `json`: JSON file save/load under a base directory

mod json;

pub use json::JsonStore;
