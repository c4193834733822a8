//! Client cursor persistence for catch-up synchronization.
//!
//! Provides:
//! - `FileCursor` - Single-file cursor with atomic replace (feature: file)
//! - `MemoryCursor` - In-process cursor (feature: memory)

pub mod storage;

#[cfg(feature = "file")]
pub use storage::FileCursor;
#[cfg(feature = "memory")]
pub use storage::MemoryCursor;
