// Folder Provider (composer)
//
// Picks and owns the concrete provider from configuration:
//
//   mode       | index discovery | provider
//   single     | -               | SingleMediaProvider
//   random     | yes             | MediaIndexRandom
//   random     | no              | SubfolderQueue (random)
//   sequential | yes             | MediaIndexSequential
//   sequential | no              | SubfolderQueue (sequential)
//
// When discovery walks the filesystem but an index is configured, each
// delivered item is enriched with index metadata looked up by its
// media-source URI. Enrichment failures are non-fatal; path-derived
// metadata stands in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use framecast_hub::media_index::{
    FileMetadataRequest, FileMetadataResponse, IndexTarget, MEDIA_INDEX_DOMAIN,
    SVC_GET_FILE_METADATA,
};

use super::error::{ProviderError, Result};
use super::index_random::MediaIndexRandom;
use super::index_sequential::MediaIndexSequential;
use super::single::SingleMediaProvider;
use super::subfolder::SubfolderQueue;
use super::traits::{
    FileCheck, MediaProvider, MediaProviderArc, ProviderContext, RescanOutcome,
};
use crate::config::{CardConfig, MediaSourceType};
use crate::models::{ItemMetadata, MediaItem, SharedFilters, StatsEmitter};

/// Resolved URLs are time-bounded; keep them only briefly so preload and
/// display share one round-trip without ever serving a stale token.
const RESOLVE_CACHE_TTL: Duration = Duration::from_secs(240);
const RESOLVE_CACHE_CAPACITY: u64 = 64;

/// Enrichment rows are immutable for the session
const METADATA_CACHE_CAPACITY: u64 = 1024;

pub struct FolderProvider {
    inner: MediaProviderArc,
    ctx: ProviderContext,
    enrich: bool,
    target: IndexTarget,
    refresh_seconds: Option<u64>,
    metadata_cache: moka::future::Cache<String, ItemMetadata>,
    resolve_cache: moka::future::Cache<String, String>,
}

impl FolderProvider {
    pub fn new(
        config: &CardConfig,
        ctx: ProviderContext,
        filters: SharedFilters,
        stats: Arc<StatsEmitter>,
    ) -> Result<Self> {
        let use_index = config.folder.use_media_index_for_discovery;
        let (inner, enrich): (MediaProviderArc, bool) = match config.media_source_type {
            MediaSourceType::Single => (
                Arc::new(SingleMediaProvider::new(config, ctx.clone())?),
                false,
            ),
            MediaSourceType::Folder if use_index => {
                match config.folder.mode {
                    crate::config::FolderMode::Random => (
                        Arc::new(MediaIndexRandom::new(config, ctx.clone(), filters, stats)),
                        false,
                    ),
                    crate::config::FolderMode::Sequential => (
                        Arc::new(MediaIndexSequential::new(config, ctx.clone(), filters)),
                        false,
                    ),
                }
            }
            MediaSourceType::Folder => (
                Arc::new(SubfolderQueue::new(config, ctx.clone())?),
                // Discovery and enrichment use different sources
                config.media_index.is_configured(),
            ),
        };

        let target = config
            .media_index
            .entity_id
            .clone()
            .map(IndexTarget::entity)
            .unwrap_or_default();

        Ok(Self {
            inner,
            ctx,
            enrich,
            target,
            refresh_seconds: config.refresh_seconds,
            metadata_cache: moka::future::Cache::builder()
                .max_capacity(METADATA_CACHE_CAPACITY)
                .build(),
            resolve_cache: moka::future::Cache::builder()
                .max_capacity(RESOLVE_CACHE_CAPACITY)
                .time_to_live(RESOLVE_CACHE_TTL)
                .build(),
        })
    }

    /// Re-resolve cadence for single mode, if configured
    #[must_use]
    pub const fn refresh_seconds(&self) -> Option<u64> {
        self.refresh_seconds
    }

    /// Resolve the item's media-content id into a playable URL, caching
    /// the result for the token's expected lifetime.
    pub async fn resolve_url(&self, item: &MediaItem) -> Result<String> {
        let id = item.id.clone();
        let hub = self.ctx.hub.clone();
        self.resolve_cache
            .try_get_with(id.clone(), async move {
                hub.resolve_media(&id).await.map(|resolved| resolved.url)
            })
            .await
            .map_err(|err: Arc<framecast_hub::HubError>| {
                ProviderError::Resolve(err.to_string())
            })
    }

    /// Resolve bypassing the cache; used for the single retry after a
    /// media load error.
    pub async fn resolve_url_fresh(&self, item: &MediaItem) -> Result<String> {
        self.resolve_cache.invalidate(&item.id).await;
        self.resolve_url(item).await
    }

    async fn lookup_metadata(&self, uri: &str) -> Result<ItemMetadata> {
        let request = FileMetadataRequest {
            media_source_uri: uri.to_string(),
            target: self.target.clone(),
        };
        let payload = serde_json::to_value(&request)?;
        let response = self
            .ctx
            .hub
            .call_service(MEDIA_INDEX_DOMAIN, SVC_GET_FILE_METADATA, payload, true)
            .await?;
        let decoded: FileMetadataResponse = serde_json::from_value(response)?;
        Ok(ItemMetadata::from_index(&decoded.item))
    }

    /// Merge index metadata into a filesystem-discovered item. Failures
    /// only log; the path-derived metadata remains.
    async fn enrich_item(&self, item: &mut MediaItem) {
        if !self.enrich {
            return;
        }
        let uri = item.media_source_uri();
        let cached = self.metadata_cache.get(&uri).await;
        let metadata = match cached {
            Some(metadata) => Some(metadata),
            None => match self.lookup_metadata(&uri).await {
                Ok(metadata) => {
                    self.metadata_cache.insert(uri.clone(), metadata.clone()).await;
                    Some(metadata)
                }
                Err(err) => {
                    tracing::debug!(uri = %uri, error = %err, "metadata enrichment failed");
                    None
                }
            },
        };
        if let Some(metadata) = metadata {
            merge_metadata(&mut item.metadata, &metadata);
        }
    }
}

/// Overlay `from_index` onto `base`, keeping base values where the index
/// has nothing.
fn merge_metadata(base: &mut ItemMetadata, from_index: &ItemMetadata) {
    macro_rules! overlay {
        ($($field:ident),*) => {
            $(
                if from_index.$field.is_some() {
                    base.$field = from_index.$field.clone();
                }
            )*
        };
    }
    overlay!(
        filename,
        folder,
        path,
        media_source_uri,
        date_taken,
        created_time,
        modified_time,
        location_city,
        location_state,
        location_country,
        location_name,
        latitude,
        longitude,
        has_coordinates,
        is_geocoded,
        is_favorited,
        rating
    );
}

#[async_trait]
impl MediaProvider for FolderProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn next(&self) -> Result<Option<MediaItem>> {
        let mut item = self.inner.next().await?;
        if let Some(item) = item.as_mut() {
            self.enrich_item(item).await;
        }
        Ok(item)
    }

    async fn peek(&self) -> Result<Option<MediaItem>> {
        self.inner.peek().await
    }

    /// Best-effort existence check by attempting a resolve.
    async fn check_file_exists(&self, item: &MediaItem) -> Option<FileCheck> {
        match self.ctx.hub.resolve_media(&item.id).await {
            Ok(_) => Some(FileCheck {
                exists: true,
                reason: None,
            }),
            Err(err) => Some(FileCheck {
                exists: false,
                reason: Some(err.to_string()),
            }),
        }
    }

    async fn files_newer_than(&self, threshold: DateTime<Utc>) -> Result<Vec<MediaItem>> {
        self.inner.files_newer_than(threshold).await
    }

    async fn prepend(&self, items: Vec<MediaItem>) {
        self.inner.prepend(items).await;
    }

    async fn rescan(&self, current_id: Option<&str>) -> Result<RescanOutcome> {
        self.inner.rescan(current_id).await
    }

    async fn reset(&self) -> Result<()> {
        self.inner.reset().await
    }

    fn set_auto_loop(&self, enabled: bool) {
        self.inner.set_auto_loop(enabled);
    }

    fn queue_len(&self) -> usize {
        self.inner.queue_len()
    }

    async fn dispose(&self) {
        self.inner.dispose().await;
        self.resolve_cache.invalidate_all();
        self.metadata_cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FolderConfig, FolderMode, MediaIndexConfig};
    use crate::models::{shared_filters, ResolvedFilters};
    use crate::navigation::exclusion::ExclusionRegistry;
    use crate::provider::traits::EmptyHistory;
    use framecast_hub::media_source::{BrowseChild, BrowsePage, MediaClass, ResolvedMedia};
    use framecast_hub::MockHubClient;
    use serde_json::json;

    fn file_page(names: &[&str]) -> BrowsePage {
        BrowsePage {
            media_content_id: String::new(),
            children: names
                .iter()
                .map(|name| BrowseChild {
                    media_content_id: format!("/photos/{name}"),
                    title: (*name).to_string(),
                    can_expand: false,
                    media_class: MediaClass::Image,
                    thumbnail: None,
                })
                .collect(),
        }
    }

    fn build(config: &CardConfig, hub: MockHubClient) -> FolderProvider {
        let hub: Arc<MockHubClient> = Arc::new(hub);
        let stats = Arc::new(StatsEmitter::new(hub.clone()));
        let ctx = ProviderContext::new(
            hub,
            Arc::new(EmptyHistory),
            Arc::new(ExclusionRegistry::new()),
        );
        FolderProvider::new(
            config,
            ctx,
            shared_filters(ResolvedFilters::default()),
            stats,
        )
        .unwrap()
    }

    fn fs_config() -> CardConfig {
        CardConfig {
            folder: FolderConfig {
                path: Some("/photos".to_string()),
                mode: FolderMode::Random,
                ..FolderConfig::default()
            },
            slideshow_window: 10,
            ..CardConfig::default()
        }
    }

    #[test]
    fn test_provider_selection_table() {
        let single = CardConfig {
            media_source_type: MediaSourceType::Single,
            media_path: Some("/a.jpg".to_string()),
            ..CardConfig::default()
        };
        let provider = build(&single, MockHubClient::new());
        assert_eq!(provider.name(), "single");

        let mut config = fs_config();
        assert_eq!(build(&config, MockHubClient::new()).name(), "subfolder");

        config.folder.use_media_index_for_discovery = true;
        assert_eq!(build(&config, MockHubClient::new()).name(), "index_random");

        config.folder.mode = FolderMode::Sequential;
        assert_eq!(
            build(&config, MockHubClient::new()).name(),
            "index_sequential"
        );

        config.folder.use_media_index_for_discovery = false;
        assert_eq!(build(&config, MockHubClient::new()).name(), "subfolder");
    }

    #[tokio::test]
    async fn test_enrichment_merges_index_metadata() {
        let mut hub = MockHubClient::new();
        hub.expect_browse_media()
            .returning(|_| Ok(file_page(&["a.jpg"])));
        hub.expect_call_service().returning(|_d, service, data, _| {
            assert_eq!(service, SVC_GET_FILE_METADATA);
            assert!(data["media_source_uri"]
                .as_str()
                .unwrap()
                .ends_with("/photos/a.jpg"));
            Ok(json!({
                "path": "/photos/a.jpg",
                "date_taken": 1_700_000_000,
                "location_city": "Lisbon",
                "is_favorited": true,
                "exif": {"FNumber": 1.8}
            }))
        });

        let mut config = fs_config();
        config.media_index = MediaIndexConfig {
            entity_id: Some("sensor.media_index".to_string()),
        };
        let provider = build(&config, hub);
        provider.initialize().await.unwrap();

        let item = provider.next().await.unwrap().unwrap();
        assert_eq!(item.metadata.location_city.as_deref(), Some("Lisbon"));
        assert_eq!(item.metadata.is_favorited, Some(true));
        // Path-derived fields survive
        assert_eq!(item.metadata.filename.as_deref(), Some("a.jpg"));
    }

    #[tokio::test]
    async fn test_enrichment_failure_is_non_fatal() {
        let mut hub = MockHubClient::new();
        hub.expect_browse_media()
            .returning(|_| Ok(file_page(&["a.jpg"])));
        hub.expect_call_service().returning(|_, _, _, _| {
            Err(framecast_hub::HubError::ServiceCall("index down".to_string()))
        });

        let mut config = fs_config();
        config.media_index = MediaIndexConfig {
            entity_id: Some("sensor.media_index".to_string()),
        };
        let provider = build(&config, hub);
        provider.initialize().await.unwrap();

        let item = provider.next().await.unwrap().unwrap();
        assert_eq!(item.metadata.filename.as_deref(), Some("a.jpg"));
        assert!(item.metadata.date_taken.is_none());
    }

    #[tokio::test]
    async fn test_resolve_url_cached_and_fresh() {
        let mut hub = MockHubClient::new();
        hub.expect_browse_media()
            .returning(|_| Ok(file_page(&["a.jpg"])));
        let calls = std::sync::atomic::AtomicUsize::new(0);
        hub.expect_resolve_media().returning(move |_| {
            let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(ResolvedMedia {
                url: format!("https://hub/a.jpg?token={n}"),
                mime_type: None,
            })
        });

        let provider = build(&fs_config(), hub);
        provider.initialize().await.unwrap();
        let item = provider.next().await.unwrap().unwrap();

        let first = provider.resolve_url(&item).await.unwrap();
        let second = provider.resolve_url(&item).await.unwrap();
        assert_eq!(first, second);

        let fresh = provider.resolve_url_fresh(&item).await.unwrap();
        assert_ne!(fresh, first);
    }
}
