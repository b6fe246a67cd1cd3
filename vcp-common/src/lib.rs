//! # VCP Common Library
//!
//! Shared code for the voice-clone pipeline crates:
//! - Error and result types
//! - Configuration loading and root folder resolution
//! - Crash-safe file replacement

pub mod config;
pub mod error;
pub mod fs;

pub use error::{Error, Result};
