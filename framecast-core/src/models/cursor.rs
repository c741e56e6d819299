//! Compound pagination cursor.
//!
//! Sequential traversal is keyed by `(sort value, id)`: the backend
//! returns rows strictly after that pair in the configured order. The sort
//! value is an algebraic key over the allowed dimensions so timestamp and
//! text cursors cannot be mixed up, and all time conversions are total
//! functions returning `None` instead of panicking on garbage.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use framecast_hub::media_index::{OrderDirection, OrderField};

use super::item::MediaItem;

/// Fields holding epoch milliseconds are occasionally produced by older
/// scanners; anything at or above this is treated as millis.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Sort value of a pagination cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortKey {
    /// Unix seconds, for date_taken / modified_time ordering
    Timestamp(i64),
    /// Raw text, for filename / path ordering
    Text(String),
}

impl SortKey {
    /// Wire form for the `after_value` request field
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Timestamp(secs) => Value::from(*secs),
            Self::Text(text) => Value::from(text.clone()),
        }
    }
}

/// Exclusive lower bound of the next sequential batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    pub value: SortKey,
    pub id: String,
}

impl PageCursor {
    #[must_use]
    pub fn new(value: SortKey, id: impl Into<String>) -> Self {
        Self {
            value,
            id: id.into(),
        }
    }

    /// Cursor for the last retained item of a batch under the given order
    #[must_use]
    pub fn from_item(item: &MediaItem, order_by: OrderField) -> Self {
        Self::new(sort_key_of(item, order_by), item.id.clone())
    }
}

/// Normalize any time-like JSON value to Unix seconds.
///
/// Accepts epoch numbers (seconds or milliseconds), ISO-8601 strings,
/// EXIF `YYYY:MM:DD hh:mm:ss` strings and bare `YYYY-MM-DD` dates.
#[must_use]
pub fn normalize_epoch_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let raw = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))?;
            Some(demote_millis(raw))
        }
        Value::String(s) => parse_time_string(s),
        _ => None,
    }
}

fn demote_millis(raw: i64) -> i64 {
    if raw.abs() >= MILLIS_THRESHOLD {
        raw / 1000
    } else {
        raw
    }
}

fn parse_time_string(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    // ISO without offset
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc().timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc().timestamp());
    }
    // EXIF DateTimeOriginal
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S") {
        return Some(naive.and_utc().timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp());
    }
    // Epoch seconds serialized as a string
    if let Ok(raw) = s.parse::<i64>() {
        return Some(demote_millis(raw));
    }
    None
}

/// Sort key of an item under the given dimension.
///
/// Temporal dimensions use the dated fallback chain so undated items sort
/// to the epoch rather than disappearing.
#[must_use]
pub fn sort_key_of(item: &MediaItem, order_by: OrderField) -> SortKey {
    match order_by {
        OrderField::DateTaken => SortKey::Timestamp(item.effective_timestamp()),
        OrderField::ModifiedTime => SortKey::Timestamp(
            item.metadata
                .modified_time
                .or(item.metadata.created_time)
                .unwrap_or(0),
        ),
        OrderField::Filename => SortKey::Text(
            item.metadata
                .filename
                .clone()
                .unwrap_or_else(|| item.id.clone()),
        ),
        OrderField::Path => SortKey::Text(
            item.metadata
                .path
                .clone()
                .unwrap_or_else(|| item.id.clone()),
        ),
    }
}

/// Total order over `(sort key, id)` in the configured direction; the id
/// breaks ties so the order is strict.
///
/// Items with no usable timestamp at all (the whole fallback chain is
/// empty) sort after every dated item in either direction instead of
/// masquerading as photos from 1970.
#[must_use]
pub fn compare_items(
    a: &MediaItem,
    b: &MediaItem,
    order_by: OrderField,
    direction: OrderDirection,
) -> Ordering {
    if order_by.is_temporal() {
        if let (SortKey::Timestamp(x), SortKey::Timestamp(y)) =
            (sort_key_of(a, order_by), sort_key_of(b, order_by))
        {
            match (x == 0, y == 0) {
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                _ => {}
            }
        }
    }
    let primary = match (sort_key_of(a, order_by), sort_key_of(b, order_by)) {
        (SortKey::Timestamp(x), SortKey::Timestamp(y)) => x.cmp(&y),
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(&y),
        // Mixed keys cannot happen for a fixed dimension; timestamps first
        // keeps the order total anyway.
        (SortKey::Timestamp(_), SortKey::Text(_)) => Ordering::Less,
        (SortKey::Text(_), SortKey::Timestamp(_)) => Ordering::Greater,
    };
    let primary = match direction {
        OrderDirection::Asc => primary,
        OrderDirection::Desc => primary.reverse(),
    };
    primary.then_with(|| match direction {
        OrderDirection::Asc => a.id.cmp(&b.id),
        OrderDirection::Desc => a.id.cmp(&b.id).reverse(),
    })
}
