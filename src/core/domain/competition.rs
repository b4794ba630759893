//! Competitions and their participants.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{CompetitionId, ParticipantId, UserId};
use crate::error::Error;

/// Competition lifecycle state. Transitions only move forward and are driven
/// by wall clock (or explicitly by an admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionStatus {
    Pending,
    Active,
    Ended,
}

impl CompetitionStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for CompetitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CompetitionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(Error::Parse(format!("unknown competition status: {other}"))),
        }
    }
}

/// A time-bounded paper-trading competition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competition {
    pub id: CompetitionId,
    pub name: String,
    pub description: Option<String>,
    /// Virtual cash each participant starts with.
    pub initial_balance: Decimal,
    /// Fee rate applied to every fill, e.g. 0.0005.
    pub fee_rate: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: CompetitionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Competition {
    /// Whether orders are accepted at `now`: the competition must be active
    /// and `now` inside its wall-clock window.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CompetitionStatus::Active && self.start_time <= now && now <= self.end_time
    }
}

/// A user's entry in one competition. Owns the virtual cash balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub competition_id: CompetitionId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub joined_at: DateTime<Utc>,
}
