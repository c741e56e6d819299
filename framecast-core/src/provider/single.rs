// Single Media Provider
//
// Degenerate provider holding exactly one item built from configuration.
// With refreshSeconds configured the consumer re-resolves the same id on
// each tick; the provider itself does not drive time.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::{ProviderError, Result};
use super::traits::{MediaProvider, ProviderContext, RescanOutcome};
use crate::config::CardConfig;
use crate::models::MediaItem;

pub struct SingleMediaProvider {
    ctx: ProviderContext,
    item: MediaItem,
    refresh_seconds: Option<u64>,
    consumed: AtomicBool,
}

impl SingleMediaProvider {
    pub fn new(config: &CardConfig, ctx: ProviderContext) -> Result<Self> {
        let path = config.media_path.as_deref().ok_or_else(|| {
            ProviderError::InvalidConfig("single mode requires mediaPath".to_string())
        })?;
        Ok(Self {
            ctx,
            item: MediaItem::from_id(path),
            refresh_seconds: config.refresh_seconds,
            consumed: AtomicBool::new(false),
        })
    }

    /// Re-resolve cadence requested by configuration, if any
    #[must_use]
    pub const fn refresh_seconds(&self) -> Option<u64> {
        self.refresh_seconds
    }
}

#[async_trait]
impl MediaProvider for SingleMediaProvider {
    fn name(&self) -> &'static str {
        "single"
    }

    async fn initialize(&self) -> Result<()> {
        self.consumed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn next(&self) -> Result<Option<MediaItem>> {
        if self.consumed.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        if self.ctx.exclusions.contains(&self.item.id) {
            return Ok(None);
        }
        Ok(Some(self.item.clone()))
    }

    async fn peek(&self) -> Result<Option<MediaItem>> {
        if self.consumed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.item.clone()))
    }

    async fn rescan(&self, _current_id: Option<&str>) -> Result<RescanOutcome> {
        let id = Some(self.item.id.clone());
        self.consumed.store(false, Ordering::SeqCst);
        Ok(RescanOutcome {
            queue_changed: false,
            previous_first: id.clone(),
            new_first: id,
        })
    }

    async fn reset(&self) -> Result<()> {
        self.consumed.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn queue_len(&self) -> usize {
        usize::from(!self.consumed.load(Ordering::SeqCst))
    }
}
