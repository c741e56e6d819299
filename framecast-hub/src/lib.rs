// Hub Transport Contracts
//
// Tier 1 of the framecast architecture: everything that crosses the wire
// to the smart-home hub lives here, behind the `HubClient` trait.
//
//   - client:       the opaque service/event channel (HubClient)
//   - media_index:  typed contracts for the media_index.* backend services
//   - media_source: browse/resolve protocol and media-source URI handling
//   - events:       entity states and the state_changed / bus event shapes
//
// The engine in framecast-core only ever talks to `HubClient`; concrete
// transports (WebSocket, test doubles) implement it elsewhere.

pub mod client;
pub mod error;
pub mod events;
pub mod media_index;
pub mod media_source;

pub use client::{
    HubClient, HubClientArc, StateChangeHandler, Subscription, WS_BROWSE_MEDIA, WS_RESOLVE_MEDIA,
};
pub use error::{HubError, Result};
pub use events::{EntityState, StateChangedEvent, QUEUE_STATS_EVENT};
pub use media_index::{
    FileMetadataRequest, FileMetadataResponse, FileType, IndexItem, IndexItemsResponse,
    IndexTarget, OrderDirection, OrderField, OrderedFilesRequest, RandomItemsRequest,
    MEDIA_INDEX_DOMAIN, SVC_GET_FILE_METADATA, SVC_GET_ORDERED_FILES, SVC_GET_RANDOM_ITEMS,
};
pub use media_source::{BrowseChild, BrowsePage, MediaClass, ResolvedMedia};

#[cfg(any(test, feature = "mock"))]
pub use client::MockHubClient;
