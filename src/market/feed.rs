//! WebSocket ticker feed
//!
//! Runs as its own task, subscribes to `ticker.<SYMBOL>` and publishes every
//! last-price update into a [`PricePublisher`]. Reconnects after a fixed
//! delay until shutdown is signalled.

use std::str::FromStr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::price::PricePublisher;
use crate::grid::GridResult;

pub const DEFAULT_WS_URL: &str = "wss://ws.backpack.exchange";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

fn stream_name(symbol: &str) -> String {
    format!("ticker.{}", symbol)
}

/// Subscription request for the ticker stream of `symbol`
pub fn subscribe_message(symbol: &str) -> String {
    json!({
        "method": "SUBSCRIBE",
        "params": [stream_name(symbol)],
    })
    .to_string()
}

/// Extract the last price from a ticker stream message for `symbol`
pub fn parse_ticker_message(text: &str, symbol: &str) -> Option<Decimal> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("stream")?.as_str()? != stream_name(symbol) {
        return None;
    }
    let last = value.get("data")?.get("c")?;
    let price = match last {
        Value::String(s) => Decimal::from_str(s.trim()).ok()?,
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok()?,
        _ => return None,
    };
    (price > Decimal::ZERO).then_some(price)
}

/// Spawn the feed task. It exits once `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_ticker_feed(
    ws_url: String,
    symbol: String,
    publisher: PricePublisher,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match run_session(&ws_url, &symbol, &publisher, &mut shutdown).await {
                Ok(true) => break,
                Ok(false) => info!("Ticker feed for {} closed by server", symbol),
                Err(e) => warn!("Ticker feed for {} failed: {}", symbol, e),
            }

            info!("Reconnecting ticker feed in {}s", RECONNECT_DELAY.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Ticker feed for {} stopped", symbol);
    })
}

/// One connection lifetime. `Ok(true)` means shutdown was requested.
async fn run_session(
    ws_url: &str,
    symbol: &str,
    publisher: &PricePublisher,
    shutdown: &mut watch::Receiver<bool>,
) -> GridResult<bool> {
    let (stream, _) = connect_async(ws_url).await?;
    let (mut write, mut read) = stream.split();

    write.send(Message::Text(subscribe_message(symbol))).await?;
    info!("Subscribed to {}", stream_name(symbol));

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(price) = parse_ticker_message(&text, symbol) {
                        debug!("{} last price {}", symbol, price);
                        publisher.publish(price);
                    }
                }
                Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(_))) | None => return Ok(false),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(true);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_subscribe_message() {
        let msg: Value = serde_json::from_str(&subscribe_message("SOL_USDC")).unwrap();
        assert_eq!(msg["method"], "SUBSCRIBE");
        assert_eq!(msg["params"][0], "ticker.SOL_USDC");
    }

    #[test]
    fn test_parse_ticker_message() {
        let text = r#"{"stream":"ticker.SOL_USDC","data":{"e":"ticker","s":"SOL_USDC","c":"142.5"}}"#;
        assert_eq!(parse_ticker_message(text, "SOL_USDC"), Some(dec!(142.5)));

        // Other symbol, malformed payloads and non-positive prices are ignored
        assert_eq!(parse_ticker_message(text, "BTC_USDC"), None);
        assert_eq!(parse_ticker_message("not json", "SOL_USDC"), None);
        assert_eq!(
            parse_ticker_message(r#"{"stream":"ticker.SOL_USDC","data":{}}"#, "SOL_USDC"),
            None
        );
        assert_eq!(
            parse_ticker_message(r#"{"stream":"ticker.SOL_USDC","data":{"c":"0"}}"#, "SOL_USDC"),
            None
        );
    }

    #[tokio::test]
    async fn test_feed_stops_on_shutdown() {
        let (publisher, _cell) = crate::market::price_channel();
        let (tx, rx) = watch::channel(false);
        // Unroutable address: the session fails and the task waits to reconnect
        let handle = spawn_ticker_feed("ws://127.0.0.1:9".into(), "SOL_USDC".into(), publisher, rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
