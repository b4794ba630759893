//! The tick ingestor: one long-lived task holding the upstream WebSocket.
//!
//! Connection lifecycle: connect, send the subscribe frame, then read framed
//! JSON ticks. Every tick is handed to the archive batcher, published on the
//! bus, and offered to the matching engine. Any connection error tears the
//! session down and the loop reconnects after a fixed delay; the feed
//! recovers fast enough that no exponential backoff is needed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::SubscribeFrame;
use super::statistics::IngestStats;
use crate::core::archive::TickBatcher;
use crate::core::bus::TickBus;
use crate::core::domain::Ticker;
use crate::core::ledger::Ledger;
use crate::core::service::MatchingEngine;
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection tuning for the upstream feed.
#[derive(Debug, Clone)]
pub struct IngestorSettings {
    pub url: String,
    pub codes: Vec<String>,
    /// Fixed delay before reconnecting after any session error.
    pub reconnect_delay: Duration,
    /// Keep-alive ping cadence.
    pub ping_interval: Duration,
    /// Drop the connection when no frame arrives for this long.
    pub idle_timeout: Duration,
}

pub struct Ingestor<L: Ledger> {
    settings: IngestorSettings,
    batcher: Arc<TickBatcher>,
    bus: Arc<TickBus>,
    matching: Arc<MatchingEngine<L>>,
    stats: Arc<IngestStats>,
}

impl<L: Ledger> Ingestor<L> {
    #[must_use]
    pub fn new(
        settings: IngestorSettings,
        batcher: Arc<TickBatcher>,
        bus: Arc<TickBus>,
        matching: Arc<MatchingEngine<L>>,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            settings,
            batcher,
            bus,
            matching,
            stats,
        }
    }

    /// Run forever: one session at a time, fixed-delay reconnect in between.
    pub async fn run(self) {
        loop {
            match self.session().await {
                Ok(()) => info!("upstream feed session closed"),
                Err(e) => warn!(error = %e, "upstream feed session failed"),
            }
            tokio::time::sleep(self.settings.reconnect_delay).await;
        }
    }

    async fn session(&self) -> Result<()> {
        let (mut ws, response) = connect_async(&self.settings.url).await?;
        info!(url = %self.settings.url, status = %response.status(), "upstream feed connected");

        let frame = SubscribeFrame::ticker(&self.settings.codes).to_json()?;
        ws.send(Message::Text(frame)).await?;
        info!(codes = self.settings.codes.len(), "subscribed to ticker stream");

        let mut ping = tokio::time::interval(self.settings.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping.tick().await;

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    ws.send(Message::Ping(Vec::new())).await?;
                }
                frame = tokio::time::timeout(self.settings.idle_timeout, ws.next()) => {
                    match frame {
                        Err(_) => {
                            return Err(Error::Connection(format!(
                                "no frame for {:?}, dropping connection",
                                self.settings.idle_timeout
                            )));
                        }
                        Ok(None) => return Err(Error::Connection("upstream stream ended".into())),
                        Ok(Some(message)) => {
                            if !self.handle(message?, &mut ws).await? {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    /// Process one frame. Returns `false` when the server closed the
    /// connection.
    async fn handle(&self, message: Message, ws: &mut WsStream) -> Result<bool> {
        match message {
            // The feed sends ticks as binary frames holding UTF-8 JSON.
            Message::Text(text) => self.on_payload(text.as_bytes()).await,
            Message::Binary(data) => self.on_payload(&data).await,
            Message::Ping(data) => {
                ws.send(Message::Pong(data)).await?;
                return Ok(true);
            }
            Message::Close(frame) => {
                info!(frame = ?frame, "upstream closed the connection");
                return Ok(false);
            }
            _ => {}
        }
        Ok(true)
    }

    async fn on_payload(&self, payload: &[u8]) {
        let tick: Ticker = match serde_json::from_slice(payload) {
            Ok(tick) => tick,
            Err(e) => {
                // Malformed frames never stop the stream.
                warn!(error = %e, "failed to parse tick frame");
                return;
            }
        };
        self.stats.record_received();
        debug!(code = %tick.code, price = %tick.trade_price, "tick");

        self.batcher.push(tick.clone());
        let delivered = self.bus.publish(&tick);
        self.stats.record_broadcast(delivered as u64);
        let fills = self.matching.process_tick(&tick).await;
        self.stats.record_matched(fills as u64);
    }
}
