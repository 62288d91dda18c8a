//! Utility functions and types

mod parallel;
pub mod pool;
pub mod simd;

pub use parallel::ParallelConfig;
pub use pool::{PoolStats, ScratchBuffer, ScratchPool};
pub use simd::{Moments, SimdOps, LANES};
