//! Shared types for the ying operations toolkit.

mod plog;
mod storage;

pub use plog::*;
pub use storage::*;
