//! Incremental log-mel feature extraction.

pub mod cache;
pub mod filterbank;
pub mod mel;
