//! Transcription sessions and the process-wide coordinator.

pub mod coordinator;
pub mod session;
