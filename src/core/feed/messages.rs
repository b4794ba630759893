//! Wire frames for the upstream feed.

use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Serialize)]
struct Ticket {
    ticket: String,
}

#[derive(Debug, Serialize)]
struct TickerSubscription {
    #[serde(rename = "type")]
    kind: &'static str,
    codes: Vec<String>,
}

/// The subscribe frame: a two-element JSON array of a ticket section and a
/// ticker subscription listing the supported codes.
#[derive(Debug, Serialize)]
pub struct SubscribeFrame(Ticket, TickerSubscription);

impl SubscribeFrame {
    #[must_use]
    pub fn ticker(codes: &[String]) -> Self {
        Self(
            Ticket {
                ticket: Uuid::new_v4().to_string(),
            },
            TickerSubscription {
                kind: "ticker",
                codes: codes.to_vec(),
            },
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
