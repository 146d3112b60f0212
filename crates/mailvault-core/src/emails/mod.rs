//! Cached email storage.

mod model;
mod repository;

pub use model::{CachedEmail, EmailListOptions};
pub use repository::EmailStore;

pub(crate) use repository::{read_email, timestamp, EMAIL_COLUMNS};
