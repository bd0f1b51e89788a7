//! Inference runtime: pooled tensor buffers and the joint-network adapter.

pub mod adapter;
pub mod tensor;
