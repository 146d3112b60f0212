//! Cached mail folder storage.

mod model;
mod repository;

pub use model::CachedFolder;
pub use repository::FolderStore;
