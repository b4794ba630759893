//! Competition lifecycle: wall-clock driven status transitions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::core::domain::{Competition, CompetitionId, CompetitionStatus};
use crate::core::ledger::Ledger;
use crate::error::{Error, Result};

pub struct LifecycleService<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> LifecycleService<L> {
    #[must_use]
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// One sweep of the two conditional bulk updates. Returns
    /// `(activated, ended)` counts.
    pub fn sweep(&self) -> Result<(usize, usize)> {
        let now = Utc::now();
        let activated = self.ledger.activate_due_competitions(now)?;
        let ended = self.ledger.end_due_competitions(now)?;
        if activated > 0 || ended > 0 {
            info!(activated, ended, "competition statuses updated");
        }
        Ok((activated, ended))
    }

    /// Periodic sweeper task. Errors are logged and the loop keeps running.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; skip it so startup does
        // not race migrations.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep() {
                error!(error = %e, "competition status sweep failed");
            }
        }
    }

    /// Explicit admin transition `pending -> active`.
    pub fn activate(&self, id: CompetitionId) -> Result<Competition> {
        self.transition(id, CompetitionStatus::Pending, CompetitionStatus::Active)
    }

    /// Explicit admin transition `active -> ended`.
    pub fn end(&self, id: CompetitionId) -> Result<Competition> {
        self.transition(id, CompetitionStatus::Active, CompetitionStatus::Ended)
    }

    fn transition(
        &self,
        id: CompetitionId,
        from: CompetitionStatus,
        to: CompetitionStatus,
    ) -> Result<Competition> {
        let competition = self
            .ledger
            .get_competition(id)?
            .ok_or(Error::NotFound("competition"))?;
        if competition.status != from {
            return Err(Error::Invalid(format!(
                "competition is {}, expected {from}",
                competition.status
            )));
        }
        self.ledger.set_competition_status(id, to, Utc::now())?;
        self.ledger
            .get_competition(id)?
            .ok_or(Error::NotFound("competition"))
    }
}
