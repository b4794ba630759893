//! The application root: every shared component, constructed once and
//! passed into handlers and tasks.

use std::sync::Arc;

use crate::app::config::Config;
use crate::core::archive::{PgTickArchive, PriceSource, TickArchive};
use crate::core::bus::TickBus;
use crate::core::cache::{CacheStore, RedisCache};
use crate::core::db::{self, DbPool};
use crate::core::feed::IngestStats;
use crate::core::ledger::PgLedger;
use crate::core::service::{
    AccountService, CompetitionService, LifecycleService, MatchingEngine, OrderService,
    RepairService,
};
use crate::error::Result;

/// Root value owning the store pool, cache, bus, and services. Nothing here
/// is a module-level singleton; tasks receive clones of these `Arc`s.
pub struct App {
    pub config: Config,
    pub pool: DbPool,
    pub ledger: Arc<PgLedger>,
    pub cache: Arc<dyn CacheStore>,
    pub archive: Arc<dyn TickArchive>,
    pub prices: Arc<PriceSource>,
    pub bus: Arc<TickBus>,
    pub stats: Arc<IngestStats>,
    pub orders: Arc<OrderService<PgLedger>>,
    pub matching: Arc<MatchingEngine<PgLedger>>,
    pub competitions: Arc<CompetitionService<PgLedger>>,
    pub accounts: Arc<AccountService<PgLedger>>,
    pub lifecycle: Arc<LifecycleService<PgLedger>>,
    pub repair: Arc<RepairService<PgLedger>>,
}

impl App {
    /// Wire every component from configuration.
    pub async fn build(config: Config) -> Result<Self> {
        let pool = db::create_pool(
            &config.database.url,
            config.database.max_pool_size,
            config.database.connection_timeout(),
            config.database.statement_timeout_ms,
        )?;

        let cache: Arc<dyn CacheStore> = match &config.cache.url {
            Some(url) => Arc::new(RedisCache::connect(url).await),
            None => Arc::new(RedisCache::disconnected()),
        };

        let ledger = Arc::new(PgLedger::new(pool.clone()));
        let archive: Arc<dyn TickArchive> = Arc::new(PgTickArchive::new(pool.clone()));
        let prices = Arc::new(PriceSource::new(Arc::clone(&archive), Arc::clone(&cache)));
        let bus = Arc::new(TickBus::new());
        let stats = IngestStats::new();

        let orders = Arc::new(OrderService::new(
            Arc::clone(&ledger),
            Arc::clone(&cache),
            Arc::clone(&prices),
        ));
        let matching = Arc::new(MatchingEngine::new(Arc::clone(&ledger), Arc::clone(&orders)));
        let competitions = Arc::new(CompetitionService::new(
            Arc::clone(&ledger),
            Arc::clone(&cache),
        ));
        let accounts = Arc::new(AccountService::new(Arc::clone(&ledger)));
        let lifecycle = Arc::new(LifecycleService::new(Arc::clone(&ledger)));
        let repair = Arc::new(RepairService::new(Arc::clone(&ledger)));

        Ok(Self {
            config,
            pool,
            ledger,
            cache,
            archive,
            prices,
            bus,
            stats,
            orders,
            matching,
            competitions,
            accounts,
            lifecycle,
            repair,
        })
    }
}
