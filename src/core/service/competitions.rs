//! Competition creation, joining, and the leaderboard projection.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::cache::{keys, CacheStore};
use crate::core::domain::{
    Competition, CompetitionId, CompetitionStatus, Participant, ParticipantId, Side, UserId,
};
use crate::core::ledger::Ledger;
use crate::error::{Error, Result};

/// One leaderboard row, ranked by cash balance. `profit_rate` is computed
/// from total asset value; the ranking deliberately stays on `balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub username: String,
    pub total_asset: Decimal,
    pub balance: Decimal,
    pub coin_value: Decimal,
    pub profit_rate: Decimal,
    pub trade_count: u64,
}

pub struct CompetitionService<L: Ledger> {
    ledger: Arc<L>,
    cache: Arc<dyn CacheStore>,
}

impl<L: Ledger> CompetitionService<L> {
    #[must_use]
    pub fn new(ledger: Arc<L>, cache: Arc<dyn CacheStore>) -> Self {
        Self { ledger, cache }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        name: &str,
        description: Option<&str>,
        initial_balance: Decimal,
        fee_rate: Decimal,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Competition> {
        if end_time <= start_time {
            return Err(Error::Invalid("end_time must be after start_time".into()));
        }
        if initial_balance <= Decimal::ZERO {
            return Err(Error::Invalid("initial_balance must be positive".into()));
        }
        let now = Utc::now();
        let competition = Competition {
            id: CompetitionId::new(),
            name: name.to_string(),
            description: description.map(str::to_string),
            initial_balance,
            fee_rate,
            start_time,
            end_time,
            status: CompetitionStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.ledger.insert_competition(&competition)?;
        info!(competition_id = %competition.id, name, "competition created");
        Ok(competition)
    }

    pub fn get(&self, id: CompetitionId) -> Result<Competition> {
        self.ledger
            .get_competition(id)?
            .ok_or(Error::NotFound("competition"))
    }

    pub fn list(&self, status: Option<CompetitionStatus>) -> Result<Vec<Competition>> {
        self.ledger.list_competitions(status)
    }

    /// Join an active competition, seeding the participant with the
    /// competition's initial balance. A user may hold at most one
    /// participation across all active competitions.
    pub fn join(&self, user: UserId, competition_id: CompetitionId) -> Result<Participant> {
        let competition = self.get(competition_id)?;
        if competition.status != CompetitionStatus::Active {
            return Err(Error::CompetitionClosed(
                "competition is not active".into(),
            ));
        }
        if self.ledger.find_participant(competition_id, user)?.is_some() {
            return Err(Error::Invalid("already participating".into()));
        }
        if let Some((_, other)) = self.ledger.find_active_participation(user)? {
            return Err(Error::Invalid(format!(
                "already participating in active competition: {}",
                other.name
            )));
        }

        let participant = Participant {
            id: ParticipantId::new(),
            competition_id,
            user_id: user,
            balance: competition.initial_balance,
            joined_at: Utc::now(),
        };
        self.ledger.insert_participant(&participant)?;
        info!(
            participant_id = %participant.id,
            competition_id = %competition_id,
            "user joined competition"
        );
        Ok(participant)
    }

    /// The leaderboard for a competition.
    ///
    /// `current_prices` maps code to mark price; without it, coin and
    /// pending-sell values fall to zero and the result is served from (and
    /// written to) the cache.
    pub async fn leaderboard(
        &self,
        competition_id: CompetitionId,
        current_prices: &HashMap<String, Decimal>,
    ) -> Result<Vec<LeaderboardEntry>> {
        let cache_key = keys::leaderboard(competition_id);
        let cacheable = current_prices.is_empty();
        if cacheable {
            if let Some(cached) = self.cache.get(&cache_key).await {
                if let Ok(entries) = serde_json::from_str::<Vec<LeaderboardEntry>>(&cached) {
                    return Ok(entries);
                }
            }
        }

        let competition = self.get(competition_id)?;
        let participants = self.ledger.list_participants_with_users(competition_id)?;

        let mut rows = Vec::with_capacity(participants.len());
        for (participant, user) in participants {
            let positions = self.ledger.list_positions(participant.id)?;
            let coin_value: Decimal = positions
                .iter()
                .map(|p| {
                    p.quantity
                        * current_prices
                            .get(p.code.as_str())
                            .copied()
                            .unwrap_or(Decimal::ZERO)
                })
                .sum();

            // Assets reserved by resting limit orders: cash for buys (at the
            // limit price plus fee), marked coin value for sells.
            let pending = self.ledger.list_pending_orders(participant.id)?;
            let reserved: Decimal = pending
                .iter()
                .map(|o| match o.side {
                    Side::Buy => {
                        let amount = o.price.unwrap_or(Decimal::ZERO) * o.quantity;
                        amount + amount * competition.fee_rate
                    }
                    Side::Sell => {
                        o.quantity
                            * current_prices
                                .get(o.code.as_str())
                                .copied()
                                .unwrap_or(Decimal::ZERO)
                    }
                })
                .sum();

            let trade_count = self.ledger.count_trades(participant.id)?;
            let total_asset = participant.balance + coin_value + reserved;
            let profit_rate = if competition.initial_balance > Decimal::ZERO {
                (total_asset - competition.initial_balance) / competition.initial_balance
                    * Decimal::ONE_HUNDRED
            } else {
                Decimal::ZERO
            };

            rows.push(LeaderboardEntry {
                rank: 0,
                username: user.display_name(),
                total_asset,
                balance: participant.balance,
                coin_value,
                profit_rate,
                trade_count,
            });
        }

        // Sorted by cash balance, descending.
        rows.sort_by(|a, b| b.balance.cmp(&a.balance));
        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = i + 1;
        }

        if cacheable {
            if let Ok(encoded) = serde_json::to_string(&rows) {
                self.cache
                    .set_ex(&cache_key, &encoded, keys::TTL_LEADERBOARD)
                    .await;
            }
        }
        Ok(rows)
    }
}
