//! Operator-based and cross-store search.

mod query;
mod unified;

pub use query::{parse_query, SearchQuery};
pub use unified::{unified_search, ResultKind, UnifiedSearchResult};
