//! Card configuration.
//!
//! The host dashboard hands the card one YAML/JSON mapping; keys are
//! camelCase on that side. Unrecognized keys are ignored so config
//! written for newer card versions does not break older ones.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::filter::FilterSpec;
use crate::models::{OrderDirection, OrderField};

pub const DEFAULT_SLIDESHOW_WINDOW: usize = 100;
pub const DEFAULT_HISTORY_SIZE: usize = 50;
pub const DEFAULT_NEW_FILES_THRESHOLD_SECONDS: u64 = 7 * 24 * 3600;
pub const DEFAULT_MAX_SHOWN_ITEMS_HISTORY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaSourceType {
    Single,
    #[default]
    Folder,
}

/// Which content types the card will deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaTypeFilter {
    Image,
    Video,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FolderMode {
    #[default]
    Random,
    Sequential,
}

/// Behavior of the auto-advance timer on manual navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutoAdvanceMode {
    /// Manual navigation restarts the timer
    #[default]
    Reset,
    /// Manual navigation cancels the timer; user resume required
    Pause,
    /// Manual navigation does not affect the timer
    Continue,
}

/// A folder-name pattern with a sampling weight multiplier.
///
/// Patterns are substrings; the first matching pattern wins and weights do
/// not compound across nested matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityFolder {
    pub pattern: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SequentialConfig {
    pub order_by: OrderField,
    pub order_direction: OrderDirection,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            order_by: OrderField::DateTaken,
            order_direction: OrderDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderConfig {
    /// Media-source URI or filesystem path of the folder to draw from
    pub path: Option<String>,
    pub mode: FolderMode,
    pub recursive: bool,

    /// Maximum recursion depth below the base folder; `None` is unlimited,
    /// 0 restricts discovery to the base folder itself.
    pub scan_depth: Option<u32>,

    /// Discover items through the index backend instead of walking the
    /// media-source tree.
    pub use_media_index_for_discovery: bool,

    pub priority_new_files: bool,
    pub new_files_threshold_seconds: u64,

    /// Library size estimate driving the per-file sampling probability
    pub estimated_total_photos: Option<u64>,

    pub priority_folders: Vec<PriorityFolder>,
    pub sequential: SequentialConfig,

    /// Bound on the shown-items set used to avoid repeats across rescans
    pub max_shown_items_history: usize,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            path: None,
            mode: FolderMode::Random,
            recursive: true,
            scan_depth: None,
            use_media_index_for_discovery: false,
            priority_new_files: false,
            new_files_threshold_seconds: DEFAULT_NEW_FILES_THRESHOLD_SECONDS,
            estimated_total_photos: None,
            priority_folders: Vec::new(),
            sequential: SequentialConfig::default(),
            max_shown_items_history: DEFAULT_MAX_SHOWN_ITEMS_HISTORY,
        }
    }
}

impl FolderConfig {
    /// Effective recursion depth: `recursive: false` forces a flat scan
    /// regardless of `scan_depth`.
    #[must_use]
    pub fn effective_scan_depth(&self) -> Option<u32> {
        if self.recursive {
            self.scan_depth
        } else {
            Some(0)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaIndexConfig {
    /// Indexer entity for instance routing when several indexers coexist
    pub entity_id: Option<String>,
}

impl MediaIndexConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.entity_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Full card configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardConfig {
    pub media_source_type: MediaSourceType,
    pub media_type: MediaTypeFilter,

    /// Source of the one item in single mode
    pub media_path: Option<String>,

    /// Re-resolve cadence for single mode; the consumer drives the clock
    pub refresh_seconds: Option<u64>,

    pub folder: FolderConfig,
    pub media_index: MediaIndexConfig,
    pub filters: FilterSpec,

    /// Target queue capacity; also the soft cap on filesystem scans
    pub slideshow_window: usize,

    pub auto_advance_seconds: Option<f64>,
    pub auto_advance_mode: AutoAdvanceMode,
    pub pause_on_interaction: bool,
    pub history_size: usize,

    pub logging: LoggingConfig,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            media_source_type: MediaSourceType::default(),
            media_type: MediaTypeFilter::default(),
            media_path: None,
            refresh_seconds: None,
            folder: FolderConfig::default(),
            media_index: MediaIndexConfig::default(),
            filters: FilterSpec::default(),
            slideshow_window: DEFAULT_SLIDESHOW_WINDOW,
            auto_advance_seconds: None,
            auto_advance_mode: AutoAdvanceMode::default(),
            pause_on_interaction: true,
            history_size: DEFAULT_HISTORY_SIZE,
            logging: LoggingConfig::default(),
        }
    }
}

impl CardConfig {
    /// Parse from a YAML document, ignoring unrecognized keys.
    pub fn from_yaml(doc: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(doc)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse card config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        match self.media_source_type {
            MediaSourceType::Single => {
                if self.media_path.is_none() {
                    return Err(Error::InvalidConfig(
                        "mediaSourceType 'single' requires mediaPath".to_string(),
                    ));
                }
            }
            MediaSourceType::Folder => {
                if self.folder.path.is_none() {
                    return Err(Error::InvalidConfig(
                        "mediaSourceType 'folder' requires folder.path".to_string(),
                    ));
                }
            }
        }
        if self.slideshow_window == 0 {
            return Err(Error::InvalidConfig(
                "slideshowWindow must be at least 1".to_string(),
            ));
        }
        for priority in &self.folder.priority_folders {
            if priority.weight <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "priority folder '{}' has non-positive weight",
                    priority.pattern
                )));
            }
        }
        Ok(())
    }

    /// Wire value for `file_type` derived from the configured media type
    #[must_use]
    pub fn file_type(&self) -> Option<framecast_hub::media_index::FileType> {
        match self.media_type {
            MediaTypeFilter::Image => Some(framecast_hub::media_index::FileType::Image),
            MediaTypeFilter::Video => Some(framecast_hub::media_index::FileType::Video),
            MediaTypeFilter::All => None,
        }
    }
}
