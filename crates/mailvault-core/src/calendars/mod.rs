//! Cached calendar metadata storage.

mod model;
mod repository;

pub use model::CachedCalendar;
pub use repository::CalendarStore;
