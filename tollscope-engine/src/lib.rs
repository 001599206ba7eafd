//! Tollscope engine library
//!
//! Identity resolution, trip segmentation and AVI mismatch detection over
//! toll transaction records. The `tollscope` binary wraps these services in a
//! command-line driver; the library is usable directly for batch analysis and
//! integration tests.

pub mod config;
pub mod services;

pub use config::{AviSettings, EngineSettings, TripSettings};
