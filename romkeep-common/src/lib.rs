//! # RomKeep Common Library
//!
//! Shared code for the RomKeep service:
//! - Error types
//! - Configuration loading and root folder resolution
//! - Bounded ring log for sync status reporting

pub mod config;
pub mod error;
pub mod ringlog;

pub use error::{Error, Result};
pub use ringlog::RingLog;
