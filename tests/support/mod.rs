//! Shared harness for integration tests: the full service stack over the
//! in-memory ledger, archive, and cache.
#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use coinarena::core::archive::{MemoryTickArchive, PriceSource, TickArchive};
use coinarena::core::cache::{keys, CacheStore, MemoryCache};
use coinarena::core::domain::{
    Competition, MarketCode, Order, OrderRequest, OrderType, Participant, Side, Ticker, User,
};
use coinarena::core::ledger::{Ledger, MemoryLedger};
use coinarena::core::service::{
    CompetitionService, LifecycleService, MatchingEngine, OrderService, RepairService,
};
use coinarena::error::Result;

pub struct Harness {
    pub ledger: Arc<MemoryLedger>,
    pub cache: Arc<MemoryCache>,
    pub archive: Arc<MemoryTickArchive>,
    pub orders: Arc<OrderService<MemoryLedger>>,
    pub matching: Arc<MatchingEngine<MemoryLedger>>,
    pub competitions: Arc<CompetitionService<MemoryLedger>>,
    pub lifecycle: Arc<LifecycleService<MemoryLedger>>,
    pub repair: Arc<RepairService<MemoryLedger>>,
    clock_ms: AtomicI64,
}

impl Harness {
    pub fn new() -> Arc<Self> {
        let ledger = Arc::new(MemoryLedger::new());
        let cache = Arc::new(MemoryCache::new());
        let archive = Arc::new(MemoryTickArchive::new());
        let prices = Arc::new(PriceSource::new(
            Arc::clone(&archive) as Arc<dyn TickArchive>,
            Arc::clone(&cache) as Arc<dyn CacheStore>,
        ));
        let orders = Arc::new(OrderService::new(
            Arc::clone(&ledger),
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            prices,
        ));
        let matching = Arc::new(MatchingEngine::new(Arc::clone(&ledger), Arc::clone(&orders)));
        let competitions = Arc::new(CompetitionService::new(
            Arc::clone(&ledger),
            Arc::clone(&cache) as Arc<dyn CacheStore>,
        ));
        let lifecycle = Arc::new(LifecycleService::new(Arc::clone(&ledger)));
        let repair = Arc::new(RepairService::new(Arc::clone(&ledger)));

        Arc::new(Self {
            ledger,
            cache,
            archive,
            orders,
            matching,
            competitions,
            lifecycle,
            repair,
            clock_ms: AtomicI64::new(1_752_300_000_000),
        })
    }

    /// A competition that is active right now with an open window.
    pub fn active_competition(&self, initial_balance: Decimal, fee_rate: Decimal) -> Competition {
        let competition = self
            .competitions
            .create(
                "arena",
                None,
                initial_balance,
                fee_rate,
                Utc::now() - ChronoDuration::hours(1),
                Utc::now() + ChronoDuration::hours(1),
            )
            .unwrap();
        self.lifecycle.sweep().unwrap();
        self.competitions.get(competition.id).unwrap()
    }

    /// The standard arena of the seed scenarios: 1,000,000 KRW, 5 bp fee.
    pub fn standard_competition(&self) -> Competition {
        self.active_competition(dec!(1_000_000), dec!(0.0005))
    }

    pub fn join(&self, competition: &Competition, external_id: &str) -> (User, Participant) {
        let user = self
            .ledger
            .upsert_user(external_id, &format!("{external_id}@example.com"), None)
            .unwrap();
        let participant = self.competitions.join(user.id, competition.id).unwrap();
        (user, participant)
    }

    /// Monotonic feed timestamp in epoch milliseconds.
    pub fn next_ts(&self) -> i64 {
        self.clock_ms.fetch_add(1_000, Ordering::SeqCst)
    }

    pub fn tick(&self, code: &str, price: Decimal) -> Ticker {
        tick_at(code, price, self.next_ts())
    }

    /// Archive a tick and refresh the 1 s price cache so the order service
    /// sees the new price immediately.
    pub async fn set_price(&self, code: &str, price: Decimal) {
        let tick = self.tick(code, price);
        self.archive.insert_batch(&[tick]).await.unwrap();
        self.cache
            .set_ex(
                &keys::ticker_latest(code),
                &price.to_string(),
                Duration::from_secs(1),
            )
            .await;
    }

    pub async fn place(
        &self,
        user: &User,
        request: OrderRequest,
        client_price: Decimal,
    ) -> Result<Order> {
        self.orders
            .place_order(user.id, &request, client_price)
            .await
    }

    pub fn balance_of(&self, participant: &Participant) -> Decimal {
        self.ledger
            .get_participant(participant.id)
            .unwrap()
            .unwrap()
            .balance
    }
}

pub fn tick_at(code: &str, price: Decimal, ts: i64) -> Ticker {
    serde_json::from_str(&format!(
        r#"{{"code":"{code}","trade_price":{price},"timestamp":{ts}}}"#
    ))
    .unwrap()
}

pub fn market(code: &str, side: Side, quantity: Decimal) -> OrderRequest {
    OrderRequest {
        code: MarketCode::from(code),
        side,
        order_type: OrderType::Market,
        quantity,
        price: None,
        idempotency_key: None,
    }
}

pub fn limit(code: &str, side: Side, quantity: Decimal, price: Decimal) -> OrderRequest {
    OrderRequest {
        code: MarketCode::from(code),
        side,
        order_type: OrderType::Limit,
        quantity,
        price: Some(price),
        idempotency_key: None,
    }
}

pub fn with_key(mut request: OrderRequest, key: &str) -> OrderRequest {
    request.idempotency_key = Some(key.to_string());
    request
}
