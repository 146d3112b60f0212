//! Sync cursor storage.
//!
//! One row per logical resource kind, upserted by the external sync layer.

mod model;
mod repository;

pub use model::SyncState;
pub use repository::SyncStateStore;
