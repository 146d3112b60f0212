//! On-disk blob caches backed by store metadata tables.

mod attachments;
mod photos;

pub use attachments::{AttachmentStats, AttachmentStore, CachedAttachment};
pub use photos::{PhotoStats, PhotoStore, DEFAULT_PHOTO_TTL};
