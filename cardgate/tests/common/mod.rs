//! Shared mocks for gateway integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cardgate::{
    BatchFetcher, BatchResponse, Card, CardId, DataPolicy, ResourceId, UpstreamResult,
};

/// Card whose upstream returns a settable value and counts its calls.
pub struct CountingCard {
    id: CardId,
    policy: Option<DataPolicy>,
    delay: Duration,
    calls: AtomicUsize,
    value: AtomicU64,
    fail: AtomicBool,
}

impl CountingCard {
    pub fn new(id: &str, value: u64) -> Self {
        Self {
            id: CardId::new(id),
            policy: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            value: AtomicU64::new(value),
            fail: AtomicBool::new(false),
        }
    }

    pub fn with_policy(mut self, policy: DataPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_value(&self, value: u64) {
        self.value.store(value, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Card<u64> for CountingCard {
    fn id(&self) -> &CardId {
        &self.id
    }

    fn data_policy(&self) -> Option<&DataPolicy> {
        self.policy.as_ref()
    }

    async fn fetch(&self) -> UpstreamResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(format!("{} upstream unavailable", self.id).into());
        }
        Ok(self.value.load(Ordering::SeqCst))
    }
}

/// Upcasts a shared mock card to the trait object the gateway takes.
pub fn dyn_card(card: &Arc<CountingCard>) -> Arc<dyn Card<u64>> {
    Arc::clone(card) as Arc<dyn Card<u64>>
}

/// Batch fetcher over a settable price table that records every call.
#[derive(Default)]
pub struct PriceTable {
    prices: Mutex<HashMap<ResourceId, u64>>,
    requests: Mutex<Vec<Vec<ResourceId>>>,
    fail: AtomicBool,
}

impl PriceTable {
    pub fn new<'a>(prices: impl IntoIterator<Item = (&'a str, u64)>) -> Arc<Self> {
        let table = Self::default();
        for (id, price) in prices {
            table.set_price(id, price);
        }
        Arc::new(table)
    }

    pub fn set_price(&self, id: &str, price: u64) {
        self.prices
            .lock()
            .unwrap()
            .insert(ResourceId::new(id), price);
    }

    pub fn remove_price(&self, id: &str) {
        self.prices.lock().unwrap().remove(id);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Vec<ResourceId>> {
        self.requests.lock().unwrap().clone()
    }
}

/// Handle registering a shared [`PriceTable`] as a batch fetcher.
pub struct SharedTable(pub Arc<PriceTable>);

#[async_trait]
impl BatchFetcher<u64> for SharedTable {
    async fn fetch_batch(&self, resource_ids: Vec<ResourceId>) -> UpstreamResult<BatchResponse<u64>> {
        self.0.requests.lock().unwrap().push(resource_ids.clone());
        if self.0.fail.load(Ordering::SeqCst) {
            return Err("price feed unavailable".into());
        }
        let prices = self.0.prices.lock().unwrap();
        Ok(resource_ids
            .into_iter()
            .filter_map(|id| prices.get(&id).map(|price| (id, *price)))
            .collect())
    }
}

/// Card reading `resources` of the `prices` source through the batch path.
pub fn price_card(id: &str, resources: &[&str], ttl: Duration) -> Arc<CountingCard> {
    CountingCard::new(id, 0)
        .with_policy(
            DataPolicy::builder()
                .source("prices")
                .resource_ids(resources.iter().copied())
                .cache_ttl(ttl)
                .batch(true)
                .build(),
        )
        .shared()
}
