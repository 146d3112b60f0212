//! Cached contact storage.

mod model;
mod repository;

pub use model::{CachedContact, ContactListOptions};
pub use repository::ContactStore;
