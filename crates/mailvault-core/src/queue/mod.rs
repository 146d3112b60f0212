//! Offline mutation queue.

mod model;
mod repository;

pub use model::{
    ActionType, DraftPayload, MarkReadPayload, MovePayload, QueuedAction, SendEmailPayload,
    StarPayload,
};
pub use repository::OfflineQueue;
