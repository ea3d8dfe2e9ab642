//! Tests for batched fetching.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cardgate::batch::BatchScheduler;
use cardgate::cache::TtlCache;
use cardgate::rate_limit::RateLimiter;
use cardgate::{
    BatchFetcher, CacheKey, CardData, CardId, DataPolicy, Gateway, GatewayError,
    RateLimitFallback, RateLimitPolicy, ResolvedPolicy, ResourceId, SourceDefaults, SourceId,
};
use common::{CountingCard, PriceTable, SharedTable, dyn_card, price_card};
use futures::future::join_all;

fn gateway_with(table: &Arc<PriceTable>) -> Gateway<u64> {
    Gateway::<u64>::builder()
        .batch_fetcher("prices", SharedTable(Arc::clone(table)))
        .build()
}

fn ids(ids: &[&str]) -> Vec<ResourceId> {
    ids.iter().copied().map(ResourceId::new).collect()
}

#[tokio::test(start_paused = true)]
async fn test_cards_of_one_source_share_one_batch_call() {
    let table = PriceTable::new([("btc", 100), ("eth", 10), ("sol", 1)]);
    let gateway = gateway_with(&table);
    let cards = [
        price_card("btc-price", &["btc"], Duration::ZERO),
        price_card("eth-price", &["eth"], Duration::ZERO),
        price_card("sol-price", &["sol"], Duration::ZERO),
    ];

    let results = join_all(cards.iter().map(|card| gateway.fetch_card_data(dyn_card(card)))).await;
    let values: Vec<_> = results.into_iter().map(Result::unwrap).collect();

    assert_eq!(
        values,
        vec![
            CardData::Single(100),
            CardData::Single(10),
            CardData::Single(1)
        ]
    );
    assert_eq!(table.requests(), vec![ids(&["btc", "eth", "sol"])]);
    assert!(cards.iter().all(|card| card.calls() == 0));
}

#[tokio::test(start_paused = true)]
async fn test_shared_resource_is_requested_once() {
    let table = PriceTable::new([("btc", 100)]);
    let gateway = gateway_with(&table);
    let ticker = price_card("btc-ticker", &["btc"], Duration::ZERO);
    let chart = price_card("btc-chart", &["btc"], Duration::ZERO);

    let (a, b) = tokio::join!(
        gateway.fetch_card_data(dyn_card(&ticker)),
        gateway.fetch_card_data(dyn_card(&chart)),
    );

    assert_eq!(a.unwrap(), CardData::Single(100));
    assert_eq!(b.unwrap(), CardData::Single(100));
    assert_eq!(table.requests(), vec![ids(&["btc"])]);
}

#[tokio::test(start_paused = true)]
async fn test_multi_resource_card_gets_keyed_map_in_order() {
    let table = PriceTable::new([("btc", 100), ("eth", 10)]);
    let gateway = gateway_with(&table);
    let card = price_card("portfolio", &["eth", "btc"], Duration::ZERO);

    let data = gateway.fetch_card_data(dyn_card(&card)).await.unwrap();

    let CardData::Batch(values) = &data else {
        panic!("expected keyed data, got {data:?}");
    };
    assert_eq!(values.keys().cloned().collect::<Vec<_>>(), ids(&["eth", "btc"]));
    assert_eq!(data.get("btc"), Some(&100));
    assert_eq!(data.get("eth"), Some(&10));
    assert_eq!(table.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_resource_fails_only_its_waiters() {
    let table = PriceTable::new([("btc", 100), ("eth", 10)]);
    let gateway = gateway_with(&table);
    let btc = price_card("btc-price", &["btc"], Duration::ZERO);
    let sol = price_card("sol-price", &["sol"], Duration::ZERO);

    let (found, missing) = tokio::join!(
        gateway.fetch_card_data(dyn_card(&btc)),
        gateway.fetch_card_data(dyn_card(&sol)),
    );

    assert_eq!(found.unwrap(), CardData::Single(100));
    match missing.unwrap_err() {
        GatewayError::NoDataForResource {
            resource,
            source_id,
        } => {
            assert_eq!(resource, ResourceId::new("sol"));
            assert_eq!(source_id, SourceId::new("prices"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(table.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_resource_falls_back_to_stale() {
    let table = PriceTable::new([("sol", 1)]);
    let gateway = gateway_with(&table);
    let sol = price_card("sol-price", &["sol"], Duration::from_millis(100));

    gateway.fetch_card_data(dyn_card(&sol)).await.unwrap();
    tokio::time::advance(Duration::from_millis(200)).await;
    table.remove_price("sol");

    let data = gateway.fetch_card_data(dyn_card(&sol)).await.unwrap();

    assert_eq!(data, CardData::Single(1));
    assert_eq!(table.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batch_result_is_cached() {
    let table = PriceTable::new([("btc", 100)]);
    let gateway = gateway_with(&table);
    let card = price_card("btc-price", &["btc"], Duration::from_secs(10));

    gateway.fetch_card_data(dyn_card(&card)).await.unwrap();
    table.set_price("btc", 200);

    assert_eq!(
        gateway.fetch_card_data(dyn_card(&card)).await.unwrap(),
        CardData::Single(100)
    );
    assert_eq!(table.calls(), 1);

    tokio::time::advance(Duration::from_secs(11)).await;
    assert_eq!(
        gateway.fetch_card_data(dyn_card(&card)).await.unwrap(),
        CardData::Single(200)
    );
    assert_eq!(table.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_ttl_resolves_every_waiter() {
    let table = PriceTable::new([("btc", 100), ("eth", 10)]);
    let gateway = gateway_with(&table);
    let btc = price_card("btc-price", &["btc"], Duration::MAX);
    let eth = price_card("eth-price", &["eth"], Duration::MAX);

    let (a, b) = tokio::join!(
        gateway.fetch_card_data(dyn_card(&btc)),
        gateway.fetch_card_data(dyn_card(&eth)),
    );

    assert_eq!(a.unwrap(), CardData::Single(100));
    assert_eq!(b.unwrap(), CardData::Single(10));
    assert_eq!(gateway.cached_count(), 2);
    assert_eq!(table.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_ttl_sees_every_price_change() {
    let table = PriceTable::new([("btc", 100)]);
    let gateway = gateway_with(&table);
    let card = price_card("btc-price", &["btc"], Duration::ZERO);

    let first = gateway.fetch_card_data(dyn_card(&card)).await.unwrap();
    table.set_price("btc", 200);
    let second = gateway.fetch_card_data(dyn_card(&card)).await.unwrap();

    assert_eq!(first, CardData::Single(100));
    assert_eq!(second, CardData::Single(200));
    assert_eq!(table.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batch_failure_falls_back_to_stale() {
    let table = PriceTable::new([("btc", 100)]);
    let gateway = gateway_with(&table);
    let card = price_card("btc-price", &["btc"], Duration::from_millis(100));

    gateway.fetch_card_data(dyn_card(&card)).await.unwrap();
    tokio::time::advance(Duration::from_millis(200)).await;
    table.set_failing(true);

    assert_eq!(
        gateway.fetch_card_data(dyn_card(&card)).await.unwrap(),
        CardData::Single(100)
    );
    assert_eq!(table.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batch_failure_without_stale_fails_every_waiter() {
    let table = PriceTable::new([("btc", 100), ("eth", 10)]);
    table.set_failing(true);
    let gateway = gateway_with(&table);
    let btc = price_card("btc-price", &["btc"], Duration::ZERO);
    let eth = price_card("eth-price", &["eth"], Duration::ZERO);

    let (a, b) = tokio::join!(
        gateway.fetch_card_data(dyn_card(&btc)),
        gateway.fetch_card_data(dyn_card(&eth)),
    );

    for error in [a.unwrap_err(), b.unwrap_err()] {
        assert!(matches!(error, GatewayError::Upstream { .. }), "{error:?}");
        assert!(error.to_string().contains("price feed unavailable"));
    }
    assert_eq!(table.calls(), 1);
}

fn limited_gateway(table: &Arc<PriceTable>, fallback: RateLimitFallback) -> Gateway<u64> {
    Gateway::<u64>::builder()
        .source_defaults(
            "prices",
            SourceDefaults::builder()
                .rate_limit(RateLimitPolicy::new(Duration::from_secs(10), 1).fallback(fallback))
                .build(),
        )
        .batch_fetcher("prices", SharedTable(Arc::clone(table)))
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_flush_errors_without_stale() {
    let table = PriceTable::new([("btc", 100)]);
    let gateway = limited_gateway(&table, RateLimitFallback::Cache);
    let card = price_card("btc-price", &["btc"], Duration::ZERO);

    gateway.fetch_card_data(dyn_card(&card)).await.unwrap();
    let error = gateway.fetch_card_data(dyn_card(&card)).await.unwrap_err();

    assert!(error.is_rate_limited(), "{error:?}");
    assert_eq!(error.source_id(), Some(&SourceId::new("prices")));
    assert_eq!(table.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_flush_serves_stale() {
    let table = PriceTable::new([("btc", 100)]);
    let gateway = limited_gateway(&table, RateLimitFallback::Cache);
    let card = price_card("btc-price", &["btc"], Duration::from_millis(100));

    gateway.fetch_card_data(dyn_card(&card)).await.unwrap();
    tokio::time::advance(Duration::from_millis(200)).await;
    table.set_price("btc", 200);

    assert_eq!(
        gateway.fetch_card_data(dyn_card(&card)).await.unwrap(),
        CardData::Single(100)
    );
    assert_eq!(table.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_flush_with_error_fallback_ignores_stale() {
    let table = PriceTable::new([("btc", 100)]);
    let gateway = limited_gateway(&table, RateLimitFallback::Error);
    let card = price_card("btc-price", &["btc"], Duration::from_millis(100));

    gateway.fetch_card_data(dyn_card(&card)).await.unwrap();
    tokio::time::advance(Duration::from_millis(200)).await;

    let error = gateway.fetch_card_data(dyn_card(&card)).await.unwrap_err();
    assert!(error.is_rate_limited(), "{error:?}");
}

#[tokio::test(start_paused = true)]
async fn test_batch_without_fetcher_uses_card_fetch() {
    let gateway = Gateway::<u64>::builder().build();
    let card = CountingCard::new("btc-price", 99)
        .with_policy(
            DataPolicy::builder()
                .source("prices")
                .resource_ids(["btc"])
                .batch(true)
                .build(),
        )
        .shared();

    let data = gateway.fetch_card_data(dyn_card(&card)).await.unwrap();

    assert_eq!(data, CardData::Single(99));
    assert_eq!(card.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_pending_dispatches_before_window() {
    let table = PriceTable::new([("btc", 100)]);
    let gateway = Gateway::<u64>::builder()
        .source_defaults(
            "prices",
            SourceDefaults::builder()
                .batch_window(Duration::from_secs(5))
                .build(),
        )
        .batch_fetcher("prices", SharedTable(Arc::clone(&table)))
        .build();
    let card = price_card("btc-price", &["btc"], Duration::ZERO);

    let request = tokio::spawn({
        let gateway = gateway.clone();
        let card = dyn_card(&card);
        async move { gateway.fetch_card_data(card).await }
    });
    while gateway.in_flight_count() == 0 {
        tokio::task::yield_now().await;
    }

    gateway.flush_pending().await;
    assert_eq!(table.calls(), 1);
    assert_eq!(request.await.unwrap().unwrap(), CardData::Single(100));

    // The armed timer finds its queue gone and does nothing.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(table.calls(), 1);
}

fn resolved(card: &str, ttl: Duration) -> Arc<ResolvedPolicy> {
    let policy = DataPolicy::builder()
        .source("prices")
        .resource_ids(["btc"])
        .cache_ttl(ttl)
        .batch(true)
        .build();
    Arc::new(ResolvedPolicy::resolve(
        &CardId::new(card),
        Some(&policy),
        &HashMap::new(),
    ))
}

#[tokio::test(start_paused = true)]
async fn test_shared_resource_is_cached_with_longest_ttl() {
    let table = PriceTable::new([("btc", 100)]);
    let mut fetchers: HashMap<SourceId, Arc<dyn BatchFetcher<u64>>> = HashMap::new();
    fetchers.insert(
        SourceId::new("prices"),
        Arc::new(SharedTable(Arc::clone(&table))),
    );
    let cache = Arc::new(TtlCache::new());
    let scheduler = Arc::new(BatchScheduler::new(
        fetchers,
        Arc::clone(&cache),
        Arc::new(RateLimiter::new()),
    ));

    let short = scheduler.enqueue(
        resolved("btc-ticker", Duration::from_secs(10)),
        CardId::new("btc-ticker"),
        ResourceId::new("btc"),
    );
    let long = scheduler.enqueue(
        resolved("btc-chart", Duration::from_secs(60)),
        CardId::new("btc-chart"),
        ResourceId::new("btc"),
    );
    assert_eq!(scheduler.pending_sources(), 1);

    assert_eq!(short.await.unwrap().unwrap(), 100);
    assert_eq!(long.await.unwrap().unwrap(), 100);
    assert_eq!(table.requests(), vec![ids(&["btc"])]);

    tokio::time::advance(Duration::from_secs(30)).await;
    let key = CacheKey::new(SourceId::new("prices"), ResourceId::new("btc"));
    assert_eq!(cache.get_fresh(&key), Some(100));
}

#[tokio::test(start_paused = true)]
async fn test_new_queue_starts_after_flush() {
    let table = PriceTable::new([("btc", 100), ("eth", 10)]);
    let gateway = gateway_with(&table);
    let btc = price_card("btc-price", &["btc"], Duration::ZERO);
    let eth = price_card("eth-price", &["eth"], Duration::ZERO);

    gateway.fetch_card_data(dyn_card(&btc)).await.unwrap();
    gateway.fetch_card_data(dyn_card(&eth)).await.unwrap();

    assert_eq!(table.requests(), vec![ids(&["btc"]), ids(&["eth"])]);
}
