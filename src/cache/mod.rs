//! Client-side query cache with hierarchical keys and selective invalidation.

pub mod key;
pub mod store;

pub use key::{KeyMatch, KeyMatcher, KeySegment, QueryFilter, QueryKey};
pub use store::{CacheEvent, EntryState, FetchFuture, Fetcher, Observer, QueryCache, RefetchType};
