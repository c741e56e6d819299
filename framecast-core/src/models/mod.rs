pub mod cursor;
pub mod filter;
pub mod item;
pub mod stats;

pub use cursor::{
    compare_items, normalize_epoch_seconds, sort_key_of, OrderDirection, OrderField, PageCursor,
    SortKey,
};
pub use filter::{
    shared_filters, DateRangeSpec, FavoritesFilter, FilterSpec, ResolvedFilters, SharedFilters,
};
pub use item::{ContentType, ItemMetadata, MediaItem};
pub use stats::{QueueStats, StatsEmitter};
