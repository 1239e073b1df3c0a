//! Index store and source implementations.

pub mod file;
pub mod memory;
pub mod snapshot;

pub use file::FileIndexStore;
pub use memory::MemoryIndexStore;
pub use snapshot::{SnapshotCategory, SnapshotRepository, TreeSnapshot};
