// Media Provider System
//
// Two-tier architecture:
//
// Tier 1: framecast-hub (wire contracts)
//   - HubClient, media_index request/response types, media-source browse
//   - No engine knowledge; usable standalone
//
// Tier 2: framecast-core/provider (this module)
//   - MediaProvider trait + the four concrete providers
//   - FolderProvider composer that selects and owns one of them

pub mod error;
pub mod folder;
pub mod index_random;
pub mod index_sequential;
pub mod queue;
pub mod single;
pub mod subfolder;
pub mod traits;

pub use error::{ProviderError, Result};
pub use folder::FolderProvider;
pub use index_random::MediaIndexRandom;
pub use index_sequential::MediaIndexSequential;
pub use queue::{ItemQueue, REFILL_THRESHOLD};
pub use single::SingleMediaProvider;
pub use subfolder::SubfolderQueue;
pub use traits::{
    EmptyHistory, FileCheck, HistoryView, MediaProvider, MediaProviderArc, ProviderContext,
    RescanOutcome,
};
