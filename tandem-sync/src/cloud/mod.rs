//! Remote document stores and the backend built on them.

mod backend;
mod folder;
mod memory;
mod storage;

pub use backend::CloudBackend;
pub use folder::FolderCloudStore;
pub use memory::MemoryCloudStore;
pub use storage::{CloudStore, CloudStoreConfig};
