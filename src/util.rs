//! Shared utility modules used across segcore components.

pub mod simd;
pub mod topk;
