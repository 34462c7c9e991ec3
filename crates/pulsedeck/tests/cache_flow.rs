//! Cache lifecycle and invalidation plumbing across the crate boundaries.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use pulsedeck::prelude::*;

fn manual_cache() -> (SwrCache, Arc<MemoryBackend>, Arc<ManualClock>) {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::new(5_000_000));
    let cache = SwrCache::new(backend.clone() as Arc<dyn KvBackend>)
        .with_clock(clock.clone() as Arc<dyn Clock>);
    (cache, backend, clock)
}

/// Unreachable API client: every request fails fast.
fn dead_api() -> ApiClient {
    ApiClient::new(
        ApiConfig::new("http://127.0.0.1:1")
            .with_max_attempts(1)
            .with_timeout(Duration::from_millis(200)),
    )
    .unwrap()
}

#[tokio::test]
async fn test_write_read_cleanup_lifecycle() {
    let (cache, _, clock) = manual_cache();

    cache
        .write("ns:a", &json!({"x": 1}), Duration::from_millis(1_000))
        .await;
    assert_eq!(cache.read::<Value>("ns:a").await, Some(json!({"x": 1})));

    clock.advance(1_100);
    assert_eq!(cache.cleanup_expired().await, 1);
    assert_eq!(cache.read::<Value>("ns:a").await, None);
}

#[tokio::test]
async fn test_invalidation_message_clears_named_entries() {
    let (cache, _, _) = manual_cache();
    let cached = CachedApi::new(dead_api(), cache.clone());
    let state = DashboardState::new();

    cache
        .write("host:web-01:24", &json!({"stale": true}), Duration::from_secs(60))
        .await;
    cache
        .write("dashboard:overview", &json!({"keep": true}), Duration::from_secs(60))
        .await;

    let msg = ServerMessage::parse(
        r#"{"type":"cache_invalidation","hostname":"web-01","cache_keys":["host:web-01:24"]}"#,
    )
    .unwrap();
    let keys = state.apply(&msg);
    assert_eq!(keys, vec!["host:web-01:24".to_string()]);
    cached.handle_invalidation(&keys).await;

    assert_eq!(cache.read::<Value>("host:web-01:24").await, None);
    assert!(cache.read::<Value>("dashboard:overview").await.is_some());
}

#[tokio::test]
async fn test_stale_overview_served_while_api_is_down() {
    let (cache, _, clock) = manual_cache();
    let cached = CachedApi::new(dead_api(), cache.clone());

    let overview = SystemOverview {
        hosts_summary: vec![HostSummary {
            hostname: "web-01".to_string(),
            current_cpu: 12.0,
            current_memory: 40.0,
            last_seen: 1_700_000_000.0,
            is_online: true,
            first_seen: None,
            platform: None,
            status: None,
        }],
        total_records: 1,
    };
    cache
        .write("dashboard:overview", &overview, Duration::from_millis(100))
        .await;
    clock.advance(600_000);

    // Long past TTL, with the API unreachable: the stale value still serves
    // the view. The failed background refresh only logs.
    let served = cached.system_overview().await.unwrap();
    assert_eq!(served, overview);
}

#[tokio::test]
async fn test_cold_cache_with_api_down_surfaces_the_failure() {
    let (cache, _, _) = manual_cache();
    let cached = CachedApi::new(dead_api(), cache);

    // Nothing cached and nothing loadable: the error propagates.
    assert!(cached.system_overview().await.is_err());
}

#[tokio::test]
async fn test_push_updates_and_cached_reads_compose() {
    let (cache, _, _) = manual_cache();
    let cached = CachedApi::new(dead_api(), cache.clone());
    let state = DashboardState::new();

    // The view primes its cache, then live updates flow in over the channel.
    cache
        .write("dashboard:hostnames", &vec!["web-01".to_string()], Duration::from_secs(300))
        .await;

    state.apply(
        &ServerMessage::parse(
            r#"{"type":"metrics_update","hostname":"web-01","metrics":{"cpu_percent":55.0,"memory_percent":70.0,"memory_available_mb":1200.0,"memory_used_mb":2800.0},"timestamp":1700.5}"#,
        )
        .unwrap(),
    );
    state.apply(
        &ServerMessage::parse(r#"{"type":"host_offline","hostname":"web-01"}"#).unwrap(),
    );

    let host = state.host("web-01").unwrap();
    assert!(!host.online);
    assert!((host.metrics.memory_percent - 70.0).abs() < f64::EPSILON);

    let hostnames: Vec<String> = cached
        .system_hostnames()
        .await
        .expect("live cache entry must serve without touching the API");
    assert_eq!(hostnames, vec!["web-01".to_string()]);

    let stats = cache.stats().await;
    assert_eq!(stats.entries, 1);
    assert!(!stats.items[0].expired);
}
