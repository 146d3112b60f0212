//! # mailvault-core
//!
//! Offline cache engine for a mail, calendar, and contacts client.
//!
//! This crate provides:
//! - Per-account `SQLite` stores with optional at-rest encryption
//! - Cached email, event, contact, folder, and calendar repositories
//! - Content-addressed attachment cache and TTL-bounded photo cache
//! - **Offline Queue** - mutations recorded while disconnected, replayed later
//! - **Search** - operator queries (`from:`, `is:unread`, ...) over FTS5 and
//!   unified search across all item kinds

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod blob;
pub mod calendars;
pub mod config;
pub mod contacts;
pub mod emails;
mod error;
pub mod events;
pub mod folders;
pub mod queue;
pub mod schema;
pub mod search;
pub mod store;
pub mod sync;

pub use blob::{AttachmentStats, AttachmentStore, CachedAttachment, PhotoStats, PhotoStore};
pub use calendars::{CachedCalendar, CalendarStore};
pub use config::{CacheSettings, StoreConfig};
pub use contacts::{CachedContact, ContactListOptions, ContactStore};
pub use emails::{CachedEmail, EmailListOptions, EmailStore};
pub use error::{Error, Result};
pub use events::{CachedEvent, EventListOptions, EventStore};
pub use folders::{CachedFolder, FolderStore};
pub use queue::{ActionType, OfflineQueue, QueuedAction};
pub use schema::init_schema;
pub use search::{parse_query, unified_search, SearchQuery, UnifiedSearchResult};
pub use store::{EncryptedStoreManager, StoreManager, StoreStats};
pub use sync::{SyncState, SyncStateStore};
