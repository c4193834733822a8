//! Cursor storage implementations.

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub use file::FileCursor;
#[cfg(feature = "memory")]
pub use memory::MemoryCursor;
