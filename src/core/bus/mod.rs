//! Broadcast bus: per-viewer fan-out of ticks.
//!
//! Each viewer owns an unbounded FIFO channel, so delivery order per viewer
//! matches publish order; nothing is guaranteed across viewers. Delivery is
//! best-effort: a send that fails (receiver dropped) evicts the viewer. The
//! bus is strictly publish-side; the socket handshake belongs to the
//! external interface layer, which speaks the DTOs defined here.

use std::collections::HashSet;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::core::domain::Ticker;

/// Viewer handshake: `{"subscribe": ["KRW-BTC", ...]}` or
/// `{"subscribe": "all"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub subscribe: SubscriptionSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionSpec {
    Codes(Vec<String>),
    All(String),
}

impl SubscriptionSpec {
    /// Subscription set for the bus; empty means "all".
    #[must_use]
    pub fn to_set(&self) -> HashSet<String> {
        match self {
            Self::Codes(codes) => codes.iter().cloned().collect(),
            Self::All(_) => HashSet::new(),
        }
    }
}

/// Handshake acknowledgement sent back to the viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeAck {
    pub status: String,
    pub codes: SubscriptionSpec,
}

impl SubscribeAck {
    #[must_use]
    pub fn subscribed(codes: SubscriptionSpec) -> Self {
        Self {
            status: "subscribed".to_string(),
            codes,
        }
    }
}

struct Viewer {
    subscriptions: HashSet<String>,
    tx: mpsc::UnboundedSender<String>,
}

/// The set of connected viewers and their subscription filters.
#[derive(Default)]
pub struct TickBus {
    viewers: DashMap<Uuid, Viewer>,
}

impl TickBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a viewer. An empty subscription set receives every code.
    /// Returns the viewer id and the receiving end of its channel.
    pub fn add_viewer(
        &self,
        subscriptions: HashSet<String>,
    ) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.viewers.insert(id, Viewer { subscriptions, tx });
        debug!(viewer = %id, viewers = self.viewers.len(), "viewer added");
        (id, rx)
    }

    pub fn remove_viewer(&self, id: Uuid) {
        self.viewers.remove(&id);
    }

    /// Fan the tick out to every viewer whose subscription matches.
    /// Returns the number of successful deliveries.
    pub fn publish(&self, tick: &Ticker) -> usize {
        let Ok(payload) = serde_json::to_string(tick) else {
            return 0;
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.viewers.iter() {
            let viewer = entry.value();
            if viewer.subscriptions.is_empty() || viewer.subscriptions.contains(&tick.code) {
                if viewer.tx.send(payload.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*entry.key());
                }
            }
        }
        for id in dead {
            self.viewers.remove(&id);
            debug!(viewer = %id, "viewer evicted after failed send");
        }
        delivered
    }

    #[must_use]
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Drop all viewers (shutdown).
    pub fn clear(&self) {
        self.viewers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(code: &str) -> Ticker {
        serde_json::from_str(&format!(
            r#"{{"code":"{code}","trade_price":100,"timestamp":1000}}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn subscription_filter_and_all() {
        let bus = TickBus::new();
        let (_, mut btc_only) = bus.add_viewer(HashSet::from(["KRW-BTC".to_string()]));
        let (_, mut all) = bus.add_viewer(HashSet::new());

        assert_eq!(bus.publish(&tick("KRW-BTC")), 2);
        assert_eq!(bus.publish(&tick("KRW-ETH")), 1);

        assert!(btc_only.try_recv().is_ok());
        assert!(btc_only.try_recv().is_err());
        assert!(all.try_recv().is_ok());
        assert!(all.try_recv().is_ok());
    }

    #[tokio::test]
    async fn failed_send_evicts_viewer() {
        let bus = TickBus::new();
        let (_, rx) = bus.add_viewer(HashSet::new());
        drop(rx);
        assert_eq!(bus.viewer_count(), 1);

        assert_eq!(bus.publish(&tick("KRW-BTC")), 0);
        assert_eq!(bus.viewer_count(), 0);
    }

    #[tokio::test]
    async fn per_viewer_order_follows_publish_order() {
        let bus = TickBus::new();
        let (_, mut rx) = bus.add_viewer(HashSet::new());

        bus.publish(&tick("KRW-BTC"));
        bus.publish(&tick("KRW-ETH"));

        let first: Ticker = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        let second: Ticker = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first.code, "KRW-BTC");
        assert_eq!(second.code, "KRW-ETH");
    }

    #[test]
    fn handshake_parses_both_shapes() {
        let list: SubscribeRequest =
            serde_json::from_str(r#"{"subscribe": ["KRW-BTC", "KRW-ETH"]}"#).unwrap();
        assert_eq!(list.subscribe.to_set().len(), 2);

        let all: SubscribeRequest = serde_json::from_str(r#"{"subscribe": "all"}"#).unwrap();
        assert!(all.subscribe.to_set().is_empty());
    }
}
