//! Cached calendar event storage.

mod model;
mod repository;

pub use model::{CachedEvent, EventListOptions};
pub use repository::EventStore;
