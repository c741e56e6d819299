//! End-to-end scenarios against a mocked hub: pagination stability,
//! filter entity toggles, random exhaustion, no-match recovery, and
//! sequential loop-back.

use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use framecast_core::config::{CardConfig, FolderConfig, FolderMode, MediaIndexConfig};
use framecast_core::models::filter::{DateRangeSpec, FavoritesFilter, FilterSpec};
use framecast_core::navigation::{NavigationController, ViewState};
use framecast_hub::media_source::ResolvedMedia;
use framecast_hub::{
    EntityState, MockHubClient, StateChangeHandler, StateChangedEvent, Subscription,
    QUEUE_STATS_EVENT,
};

type EventLog = Arc<Mutex<Vec<(String, Value)>>>;
type RequestLog = Arc<Mutex<Vec<(String, Value)>>>;
type HandlerSlot = Arc<Mutex<Option<StateChangeHandler>>>;

fn showing(controller: &NavigationController) -> Option<framecast_core::models::MediaItem> {
    match &*controller.view().borrow() {
        ViewState::Showing { item, .. } => Some(item.clone()),
        _ => None,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition within deadline");
}

fn fire(handler: &HandlerSlot, entity_id: &str) {
    let event = StateChangedEvent {
        entity_id: entity_id.to_string(),
        old_state: None,
        new_state: None,
    };
    let callback = handler
        .lock()
        .as_ref()
        .expect("subscription installed")
        .clone();
    (*callback)(event);
}

fn index_row(name: &str, favorited: bool) -> Value {
    json!({
        "path": format!("/photos/{name}"),
        "media_source_uri": format!("media-source://media_source/photos/{name}"),
        "filename": name,
        "is_favorited": favorited,
    })
}

/// Ordered traversal spans several backend pages without yielding any
/// item twice or skipping one, and breaks timestamp ties by id.
#[tokio::test]
async fn sequential_pagination_is_stable_across_batches() {
    // Twelve rows, timestamps 100 down to 89 with a tie at 94, served
    // newest-first with strictly-after cursor semantics. Window 5, so
    // the full pass takes three pages.
    fn library() -> Vec<Value> {
        let mut rows: Vec<Value> = [
            (100, "l.jpg"),
            (99, "k.jpg"),
            (98, "j.jpg"),
            (97, "i.jpg"),
            (96, "h.jpg"),
            (94, "g.jpg"),
            (94, "f.jpg"),
            (93, "e.jpg"),
            (92, "d.jpg"),
            (91, "c.jpg"),
            (90, "b.jpg"),
            (89, "a.jpg"),
        ]
        .iter()
        .map(|(ts, name)| {
            json!({
                "path": format!("/photos/{name}"),
                "media_source_uri": format!("media-source://media_source/photos/{name}"),
                "filename": name,
                "date_taken": ts,
            })
        })
        .collect();
        rows.sort_by(|a, b| {
            let ta = a["date_taken"].as_i64().unwrap();
            let tb = b["date_taken"].as_i64().unwrap();
            tb.cmp(&ta).then_with(|| {
                b["media_source_uri"]
                    .as_str()
                    .unwrap()
                    .cmp(a["media_source_uri"].as_str().unwrap())
            })
        });
        rows
    }

    let mut hub = MockHubClient::new();
    hub.expect_fire_event().returning(|_, _| Ok(()));
    hub.expect_call_service().returning(|_d, _s, data, _rr| {
        let count = data["count"].as_u64().unwrap_or(0) as usize;
        let after_value = data.get("after_value").and_then(Value::as_i64);
        let after_id = data.get("after_id").and_then(Value::as_str);
        let rows: Vec<Value> = library()
            .into_iter()
            .filter(|row| match (after_value, after_id) {
                (Some(av), Some(ai)) => {
                    let ts = row["date_taken"].as_i64().unwrap();
                    let id = row["media_source_uri"].as_str().unwrap();
                    ts < av || (ts == av && id < ai)
                }
                _ => true,
            })
            .take(count)
            .collect();
        Ok(json!({ "items": rows }))
    });
    hub.expect_resolve_media().returning(|id| {
        Ok(ResolvedMedia {
            url: format!("https://hub/{id}"),
            mime_type: None,
        })
    });

    let config = CardConfig {
        folder: FolderConfig {
            path: Some("/photos".to_string()),
            mode: FolderMode::Sequential,
            use_media_index_for_discovery: true,
            ..FolderConfig::default()
        },
        slideshow_window: 5,
        ..CardConfig::default()
    };

    let controller = NavigationController::new(&config, Arc::new(hub)).unwrap();
    assert!(controller.start().await.unwrap());

    let mut seen = vec![showing(&controller).expect("first item")];
    for _ in 0..11 {
        controller.advance().await;
        seen.push(showing(&controller).expect("next item"));
    }

    let timestamps: Vec<i64> = seen
        .iter()
        .map(|item| item.metadata.date_taken.unwrap_or_default())
        .collect();
    assert_eq!(
        timestamps,
        vec![100, 99, 98, 97, 96, 94, 94, 93, 92, 91, 90, 89]
    );

    // The tie at 94 is broken by id, descending
    assert_eq!(seen[5].metadata.filename.as_deref(), Some("g.jpg"));
    assert_eq!(seen[6].metadata.filename.as_deref(), Some("f.jpg"));

    // No item yielded twice, none skipped
    let distinct: std::collections::HashSet<&str> =
        seen.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(distinct.len(), 12);

    controller.dispose().await;
}

/// Toggling a favorites filter entity clears queue and history,
/// requeries with favorites_only, and emits queue statistics.
#[tokio::test]
async fn filter_entity_toggle_reloads_queue() {
    let favs_state = Arc::new(Mutex::new("off".to_string()));
    let handler: HandlerSlot = Arc::new(Mutex::new(None));
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let requests: RequestLog = Arc::new(Mutex::new(Vec::new()));

    let mut hub = MockHubClient::new();
    {
        let favs_state = favs_state.clone();
        hub.expect_get_state().returning(move |id| {
            Ok(Some(EntityState::new(id, favs_state.lock().clone())))
        });
    }
    {
        let handler = handler.clone();
        hub.expect_subscribe_state_changes().returning(move |h| {
            *handler.lock() = Some(h);
            Subscription::noop()
        });
    }
    {
        let events = events.clone();
        hub.expect_fire_event().returning(move |event_type, payload| {
            events.lock().push((event_type.to_string(), payload));
            Ok(())
        });
    }
    {
        let requests = requests.clone();
        hub.expect_call_service()
            .returning(move |_domain, service, data, _rr| {
                requests.lock().push((service.to_string(), data.clone()));
                let favorites_only = data
                    .get("favorites_only")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let items = if favorites_only {
                    vec![index_row("fav1.jpg", true), index_row("fav2.jpg", true)]
                } else {
                    vec![index_row("plain1.jpg", false), index_row("plain2.jpg", false)]
                };
                Ok(json!({ "items": items }))
            });
    }
    hub.expect_resolve_media().returning(|id| {
        Ok(ResolvedMedia {
            url: format!("https://hub/{id}?auth=t"),
            mime_type: None,
        })
    });

    let config = CardConfig {
        folder: FolderConfig {
            path: Some("/photos".to_string()),
            mode: FolderMode::Random,
            use_media_index_for_discovery: true,
            ..FolderConfig::default()
        },
        media_index: MediaIndexConfig {
            entity_id: Some("sensor.media_index".to_string()),
        },
        filters: FilterSpec {
            favorites: Some(FavoritesFilter::Entity(
                "input_boolean.show_favs".to_string(),
            )),
            date_range: None,
        },
        slideshow_window: 5,
        ..CardConfig::default()
    };

    let controller = NavigationController::new(&config, Arc::new(hub)).unwrap();
    assert!(controller.start().await.unwrap());
    let before = showing(&controller).expect("item before toggle");
    assert_eq!(before.metadata.is_favorited, Some(false));

    // Toggle the entity on and push the state_changed event through the
    // global stream.
    *favs_state.lock() = "on".to_string();
    fire(&handler, "input_boolean.show_favs");

    wait_until(|| {
        showing(&controller).is_some_and(|item| item.metadata.is_favorited == Some(true))
    })
    .await;

    // History was cleared: retreating from the first post-change item is
    // a no-op, never a pre-change item.
    let current = showing(&controller).expect("favorited item");
    controller.retreat().await;
    assert_eq!(showing(&controller).expect("unchanged").id, current.id);

    // The post-change query carried favorites_only
    let last_query = requests
        .lock()
        .iter()
        .rev()
        .find(|(service, _)| service == "get_random_items")
        .map(|(_, data)| data.clone())
        .expect("random query recorded");
    assert_eq!(last_query["favorites_only"], json!(true));

    // Queue statistics fired with the favorites filter active
    let stats_event = events
        .lock()
        .iter()
        .rev()
        .find(|(event_type, _)| event_type == QUEUE_STATS_EVENT)
        .map(|(_, payload)| payload.clone())
        .expect("queue stats event");
    let active: Vec<String> =
        serde_json::from_value(stats_event["active_filters"].clone()).unwrap();
    assert!(active.contains(&"favorites".to_string()));

    controller.dispose().await;
}

/// A date range matching nothing surfaces NoMatchingItems; widening
/// the range through the entity recovers without a restart.
#[tokio::test]
async fn no_match_filters_recover_on_entity_change() {
    let range_start = Arc::new(Mutex::new("2031-01-01".to_string()));
    let handler: HandlerSlot = Arc::new(Mutex::new(None));

    let mut hub = MockHubClient::new();
    {
        let range_start = range_start.clone();
        hub.expect_get_state().returning(move |id| {
            Ok(Some(EntityState::new(id, range_start.lock().clone())))
        });
    }
    {
        let handler = handler.clone();
        hub.expect_subscribe_state_changes().returning(move |h| {
            *handler.lock() = Some(h);
            Subscription::noop()
        });
    }
    hub.expect_fire_event().returning(|_, _| Ok(()));
    hub.expect_call_service().returning(|_d, _s, data, _rr| {
        let from = data.get("date_from").and_then(Value::as_str).unwrap_or("");
        if from == "2031-01-01" {
            Ok(json!({ "items": [] }))
        } else {
            Ok(json!({ "items": [index_row("spring.jpg", false)] }))
        }
    });
    hub.expect_resolve_media().returning(|id| {
        Ok(ResolvedMedia {
            url: format!("https://hub/{id}"),
            mime_type: None,
        })
    });

    let config = CardConfig {
        folder: FolderConfig {
            path: Some("/photos".to_string()),
            mode: FolderMode::Random,
            use_media_index_for_discovery: true,
            ..FolderConfig::default()
        },
        filters: FilterSpec {
            favorites: None,
            date_range: Some(DateRangeSpec {
                start: Some("input_datetime.range_start".to_string()),
                end: None,
            }),
        },
        slideshow_window: 5,
        ..CardConfig::default()
    };

    let controller = NavigationController::new(&config, Arc::new(hub)).unwrap();
    let started = controller.start().await.unwrap();
    assert!(!started);
    assert_eq!(*controller.view().borrow(), ViewState::NoMatchingItems);

    *range_start.lock() = "2024-01-01".to_string();
    fire(&handler, "input_datetime.range_start");

    wait_until(|| showing(&controller).is_some()).await;
    assert!(showing(&controller)
        .expect("recovered item")
        .id
        .ends_with("spring.jpg"));

    controller.dispose().await;
}

/// When the ordered sequence is exhausted the traversal loops: cursor
/// cleared, exclusions flushed, first item of the order again.
#[tokio::test]
async fn sequential_loop_restarts_from_first_item() {
    fn library() -> Vec<Value> {
        vec![
            json!({"path": "/p/c.jpg", "media_source_uri": "ms://c", "date_taken": 30}),
            json!({"path": "/p/b.jpg", "media_source_uri": "ms://b", "date_taken": 20}),
            json!({"path": "/p/a.jpg", "media_source_uri": "ms://a", "date_taken": 10}),
        ]
    }

    let mut hub = MockHubClient::new();
    hub.expect_fire_event().returning(|_, _| Ok(()));
    hub.expect_call_service().returning(|_d, _s, data, _rr| {
        let count = data["count"].as_u64().unwrap_or(0) as usize;
        let after_value = data.get("after_value").and_then(Value::as_i64);
        let after_id = data.get("after_id").and_then(Value::as_str);
        let rows: Vec<Value> = library()
            .into_iter()
            .filter(|row| match (after_value, after_id) {
                (Some(av), Some(ai)) => {
                    let ts = row["date_taken"].as_i64().unwrap();
                    let id = row["media_source_uri"].as_str().unwrap();
                    ts < av || (ts == av && id < ai)
                }
                _ => true,
            })
            .take(count)
            .collect();
        Ok(json!({ "items": rows }))
    });
    hub.expect_resolve_media().returning(|id| {
        Ok(ResolvedMedia {
            url: format!("https://hub/{id}"),
            mime_type: None,
        })
    });

    let config = CardConfig {
        folder: FolderConfig {
            path: Some("/photos".to_string()),
            mode: FolderMode::Sequential,
            use_media_index_for_discovery: true,
            ..FolderConfig::default()
        },
        slideshow_window: 5,
        ..CardConfig::default()
    };

    let controller = NavigationController::new(&config, Arc::new(hub)).unwrap();
    assert!(controller.start().await.unwrap());
    assert_eq!(showing(&controller).unwrap().id, "ms://c");

    // Exclude the middle item mid-lap: it is skipped on dequeue
    controller
        .exclude("ms://b", framecast_core::navigation::ExclusionReason::Deleted)
        .await;
    controller.advance().await;
    assert_eq!(showing(&controller).unwrap().id, "ms://a");

    // Sequence exhausted: the next advance loops back to the first item
    // of the configured order
    controller.advance().await;
    assert_eq!(showing(&controller).unwrap().id, "ms://c");

    // The loop flushed the exclusion registry, so the once-deleted item
    // plays on the replay lap
    controller.advance().await;
    assert_eq!(showing(&controller).unwrap().id, "ms://b");

    controller.dispose().await;
}

/// Two consecutive refills dominated by already-shown items latch the
/// exhaustion state: the next refill request omits priority_new_files,
/// and a fresh batch afterwards restores the priority path.
#[tokio::test]
async fn random_exhaustion_latch_drops_priority_path() {
    let requests: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let fresh = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut hub = MockHubClient::new();
    hub.expect_fire_event().returning(|_, _| Ok(()));
    {
        let requests = requests.clone();
        let fresh = fresh.clone();
        hub.expect_call_service()
            .returning(move |_d, service, data, _rr| {
                requests.lock().push((service.to_string(), data.clone()));
                let priority = data
                    .get("priority_new_files")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if priority {
                    // The novelty query keeps returning the same two
                    // items, which are on screen or queued from the
                    // very first batch onward.
                    Ok(json!({
                        "items": [index_row("p1.jpg", false), index_row("p2.jpg", false)]
                    }))
                } else {
                    let count = data["count"].as_u64().unwrap_or(1) as usize;
                    let items: Vec<Value> = (0..count)
                        .map(|_| {
                            let n = fresh.fetch_add(1, AtomicOrdering::SeqCst);
                            index_row(&format!("new{n:03}.jpg"), false)
                        })
                        .collect();
                    Ok(json!({ "items": items }))
                }
            });
    }
    hub.expect_resolve_media().returning(|id| {
        Ok(ResolvedMedia {
            url: format!("https://hub/{id}"),
            mime_type: None,
        })
    });

    let config = CardConfig {
        folder: FolderConfig {
            path: Some("/photos".to_string()),
            mode: FolderMode::Random,
            use_media_index_for_discovery: true,
            priority_new_files: true,
            ..FolderConfig::default()
        },
        slideshow_window: 3,
        ..CardConfig::default()
    };

    let controller = NavigationController::new(&config, Arc::new(hub)).unwrap();
    assert!(controller.start().await.unwrap());
    for _ in 0..4 {
        controller.advance().await;
    }

    // Chronological priority flags of the get_random_items requests:
    //   initialize            -> priority
    //   refill 1              -> priority (100% dupes) + fallback retry
    //   refill 2              -> priority (100% dupes) + fallback retry,
    //                            second strike latches exhaustion
    //   refill 3 (latched)    -> single request WITHOUT the priority flag
    //   refill 4 (fresh batch -> latch reset) -> priority again
    let flags: Vec<Option<bool>> = requests
        .lock()
        .iter()
        .map(|(_, data)| data.get("priority_new_files").and_then(Value::as_bool))
        .collect();
    assert!(flags.len() >= 7, "expected at least 7 requests, got {flags:?}");
    assert_eq!(
        flags[..7],
        [
            Some(true),
            Some(true),
            None,
            Some(true),
            None,
            None,
            Some(true),
        ]
    );

    controller.dispose().await;
}

/// Serialized advances: a burst of concurrent advance calls collapses
/// into at most one in-flight dequeue.
#[tokio::test]
async fn concurrent_advances_collapse() {
    let served = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut hub = MockHubClient::new();
    hub.expect_fire_event().returning(|_, _| Ok(()));
    {
        let served = served.clone();
        hub.expect_call_service().returning(move |_d, _s, data, _rr| {
            let count = data["count"].as_u64().unwrap_or(0) as usize;
            let items: Vec<Value> = (0..count)
                .map(|_| {
                    let n = served.fetch_add(1, AtomicOrdering::SeqCst);
                    index_row(&format!("img{n:04}.jpg"), false)
                })
                .collect();
            Ok(json!({ "items": items }))
        });
    }
    hub.expect_resolve_media().returning(|id| {
        Ok(ResolvedMedia {
            url: format!("https://hub/{id}"),
            mime_type: None,
        })
    });

    let config = CardConfig {
        folder: FolderConfig {
            path: Some("/photos".to_string()),
            mode: FolderMode::Random,
            use_media_index_for_discovery: true,
            ..FolderConfig::default()
        },
        slideshow_window: 20,
        ..CardConfig::default()
    };

    let controller = NavigationController::new(&config, Arc::new(hub)).unwrap();
    assert!(controller.start().await.unwrap());
    let first = showing(&controller).unwrap();

    // Fire a burst without awaiting in between
    let burst: Vec<_> = (0..5)
        .map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move { controller.advance().await })
        })
        .collect();
    for handle in burst {
        handle.await.unwrap();
    }

    // At least one advance landed; collapsed duplicates moved at most a
    // handful of steps, never five full dequeues plus replays
    let after = showing(&controller).unwrap();
    assert_ne!(after.id, first.id);

    controller.dispose().await;
}
