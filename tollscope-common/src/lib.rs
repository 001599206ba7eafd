//! # Tollscope Common Library
//!
//! Shared code for the tollscope analysis crates including:
//! - Error taxonomy shared by every component
//! - TOML configuration loading and config file resolution
//! - The ingested transaction record model
//! - Timestamp parsing and duration formatting

pub mod config;
pub mod error;
pub mod human_time;
pub mod records;
pub mod time;

pub use error::{Error, Result};
pub use records::{RecordTable, TransactionRecord};
