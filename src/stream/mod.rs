//! Detection and trade event stream
//!
//! WebSocket client feeding the pipeline: new-token creation events become
//! [`DetectionEvent`]s for the admission queue, and trades on currently open
//! positions become [`PriceTick`]s for the monitor. Whale attribution happens
//! here at the feed boundary, so the analyzer never needs per-transaction
//! history.
//!
//! WebSocket endpoint: wss://pumpportal.fun/api/data

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::position::monitor::PriceTick;
use crate::position::PositionBook;
use crate::queue::DetectionMeta;

/// Seconds between trade-subscription refreshes for open positions
const TRADE_SUBSCRIPTION_REFRESH_SECS: u64 = 10;

/// A newly detected candidate
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub mint: String,
    pub meta: DetectionMeta,
}

/// Subscription methods
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionMessage {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl SubscriptionMessage {
    /// Subscribe to new token creation events
    pub fn subscribe_new_tokens() -> Self {
        Self {
            method: "subscribeNewToken".to_string(),
            keys: None,
        }
    }

    /// Subscribe to trades on specific tokens
    pub fn subscribe_token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "subscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }
}

/// New token event on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTokenEvent {
    #[serde(default)]
    pub signature: String,
    pub mint: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Trade event on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub mint: String,
    #[serde(default)]
    pub sol_amount: f64,
    #[serde(default)]
    pub v_tokens_in_bonding_curve: f64,
    #[serde(default)]
    pub v_sol_in_bonding_curve: f64,
}

impl TradeEvent {
    /// Bonding-curve spot price in SOL per token
    pub fn spot_price(&self) -> Option<f64> {
        if self.v_tokens_in_bonding_curve > 0.0 {
            Some(self.v_sol_in_bonding_curve / self.v_tokens_in_bonding_curve)
        } else {
            None
        }
    }
}

/// Convert a trade into a tick, attributing whale volume at the boundary
fn tick_from_trade(trade: &TradeEvent, whale_trade_min_sol: f64) -> Option<PriceTick> {
    let price = trade.spot_price()?;
    let whale_volume = if trade.sol_amount >= whale_trade_min_sol {
        trade.sol_amount
    } else {
        0.0
    };
    Some(PriceTick {
        mint: trade.mint.clone(),
        price,
        volume: trade.sol_amount,
        whale_volume,
    })
}

/// The detection stream client
pub struct DetectionStream {
    config: StreamConfig,
    whale_trade_min_sol: f64,
    detection_tx: mpsc::Sender<DetectionEvent>,
    tick_tx: mpsc::Sender<PriceTick>,
    book: Arc<PositionBook>,
}

impl DetectionStream {
    pub fn new(
        config: StreamConfig,
        whale_trade_min_sol: f64,
        detection_tx: mpsc::Sender<DetectionEvent>,
        tick_tx: mpsc::Sender<PriceTick>,
        book: Arc<PositionBook>,
    ) -> Self {
        Self {
            config,
            whale_trade_min_sol,
            detection_tx,
            tick_tx,
            book,
        }
    }

    /// Start the reconnecting client
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut reconnect_attempts = 0u32;

        loop {
            if shutdown.is_cancelled() {
                info!("detection stream stopped");
                return Ok(());
            }

            match self.session(&shutdown).await {
                Ok(()) => {
                    // Clean disconnect (shutdown or server close)
                    reconnect_attempts = 0;
                    if shutdown.is_cancelled() {
                        info!("detection stream stopped");
                        return Ok(());
                    }
                }
                Err(e) => {
                    error!("stream session failed: {}", e);
                    reconnect_attempts += 1;

                    if self.config.max_reconnect_attempts > 0
                        && reconnect_attempts >= self.config.max_reconnect_attempts
                    {
                        return Err(Error::StreamConnection(format!(
                            "gave up after {} reconnect attempts",
                            reconnect_attempts
                        )));
                    }
                }
            }

            let delay = Duration::from_millis(self.config.reconnect_delay_ms);
            warn!("reconnecting in {:?}", delay);
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One connected session: subscribe and route events until disconnect
    async fn session(&self, shutdown: &CancellationToken) -> Result<()> {
        info!("connecting to {}", self.config.ws_url);

        let url = url::Url::parse(&self.config.ws_url)
            .map_err(|e| Error::Config(format!("invalid WebSocket URL: {}", e)))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::StreamConnection(e.to_string()))?;

        info!("detection stream connected");
        let (mut write, mut read) = ws_stream.split();

        let subscribe = SubscriptionMessage::subscribe_new_tokens();
        write
            .send(Message::Text(serde_json::to_string(&subscribe)?))
            .await
            .map_err(|e| Error::StreamConnection(format!("subscribe failed: {}", e)))?;

        // Trade subscriptions follow the set of open positions
        let mut refresh =
            tokio::time::interval(Duration::from_secs(TRADE_SUBSCRIPTION_REFRESH_SECS));
        let mut subscribed: Vec<String> = Vec::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }

                _ = refresh.tick() => {
                    let mints: Vec<String> = self
                        .book
                        .summaries()
                        .into_iter()
                        .map(|p| p.mint)
                        .collect();
                    if !mints.is_empty() && mints != subscribed {
                        let msg = SubscriptionMessage::subscribe_token_trades(mints.clone());
                        write
                            .send(Message::Text(serde_json::to_string(&msg)?))
                            .await
                            .map_err(|e| Error::StreamConnection(format!("trade subscribe failed: {}", e)))?;
                        debug!("tracking trades for {} open positions", mints.len());
                        subscribed = mints;
                    }
                }

                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.route_message(&text).await,
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("detection stream disconnected");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(Error::StreamConnection(e.to_string()));
                    }
                },
            }
        }
    }

    /// Route one wire message by its `txType` discriminator
    async fn route_message(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => return, // acks and server notices
        };

        match value.get("txType").and_then(|t| t.as_str()) {
            Some("create") => match serde_json::from_value::<NewTokenEvent>(value) {
                Ok(event) => {
                    debug!("detected {} ({})", event.mint, event.symbol.as_deref().unwrap_or("?"));
                    let detection = DetectionEvent {
                        mint: event.mint.clone(),
                        meta: DetectionMeta {
                            signature: event.signature,
                            name: event.name,
                            symbol: event.symbol,
                        },
                    };
                    if self.detection_tx.send(detection).await.is_err() {
                        warn!("detection channel closed");
                    }
                }
                Err(e) => debug!("undecodable create event: {}", e),
            },
            Some("buy") | Some("sell") => match serde_json::from_value::<TradeEvent>(value) {
                Ok(trade) => {
                    // Only open positions need ticks
                    if !self.book.contains(&trade.mint) {
                        return;
                    }
                    if let Some(tick) = tick_from_trade(&trade, self.whale_trade_min_sol) {
                        if self.tick_tx.send(tick).await.is_err() {
                            warn!("tick channel closed");
                        }
                    }
                }
                Err(e) => debug!("undecodable trade event: {}", e),
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_serialization() {
        let msg = SubscriptionMessage::subscribe_new_tokens();
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"method":"subscribeNewToken"}"#
        );

        let msg = SubscriptionMessage::subscribe_token_trades(vec!["m1".to_string()]);
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"method":"subscribeTokenTrade","keys":["m1"]}"#
        );
    }

    #[test]
    fn test_parse_new_token_event() {
        let json = r#"{
            "signature": "sig123",
            "mint": "mintABC",
            "txType": "create",
            "name": "Test Token",
            "symbol": "TST"
        }"#;

        let event: NewTokenEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.mint, "mintABC");
        assert_eq!(event.symbol.as_deref(), Some("TST"));
    }

    #[test]
    fn test_trade_spot_price() {
        let trade = TradeEvent {
            mint: "m1".to_string(),
            sol_amount: 0.5,
            v_tokens_in_bonding_curve: 1_000_000.0,
            v_sol_in_bonding_curve: 30.0,
        };
        assert_eq!(trade.spot_price(), Some(0.00003));

        let empty = TradeEvent {
            mint: "m1".to_string(),
            sol_amount: 0.5,
            v_tokens_in_bonding_curve: 0.0,
            v_sol_in_bonding_curve: 30.0,
        };
        assert_eq!(empty.spot_price(), None);
    }

    #[test]
    fn test_whale_attribution_at_boundary() {
        let whale = TradeEvent {
            mint: "m1".to_string(),
            sol_amount: 2.5,
            v_tokens_in_bonding_curve: 1_000_000.0,
            v_sol_in_bonding_curve: 30.0,
        };
        let tick = tick_from_trade(&whale, 1.0).unwrap();
        assert_eq!(tick.whale_volume, 2.5);

        let retail = TradeEvent {
            sol_amount: 0.2,
            ..whale
        };
        let tick = tick_from_trade(&retail, 1.0).unwrap();
        assert_eq!(tick.volume, 0.2);
        assert_eq!(tick.whale_volume, 0.0);
    }
}
