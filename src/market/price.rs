//! Latest-price cell shared between the feed task and the engine
//!
//! Backed by a `tokio::sync::watch` channel: the publisher overwrites the
//! value, readers only ever see the most recent price. No backlog is kept.

use rust_decimal::Decimal;
use tokio::sync::watch;

/// Write half, owned by the price feed task
#[derive(Debug)]
pub struct PricePublisher {
    tx: watch::Sender<Option<Decimal>>,
}

/// Read half, handed to the engine and the paper exchange
#[derive(Debug, Clone)]
pub struct PriceCell {
    rx: watch::Receiver<Option<Decimal>>,
}

/// Create an empty price cell
pub fn price_channel() -> (PricePublisher, PriceCell) {
    let (tx, rx) = watch::channel(None);
    (PricePublisher { tx }, PriceCell { rx })
}

impl PricePublisher {
    /// Overwrite the latest price. Non-positive prices are ignored.
    pub fn publish(&self, price: Decimal) {
        if price > Decimal::ZERO {
            self.tx.send_replace(Some(price));
        }
    }

    pub fn subscribe(&self) -> PriceCell {
        PriceCell {
            rx: self.tx.subscribe(),
        }
    }
}

impl PriceCell {
    /// Most recent published price, if any
    pub fn latest(&self) -> Option<Decimal> {
        *self.rx.borrow()
    }

    /// Wait until a new price is published. Returns `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<Decimal> {
        self.rx.changed().await.ok()?;
        *self.rx.borrow_and_update()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_only_latest_price_is_visible() {
        let (publisher, cell) = price_channel();
        assert_eq!(cell.latest(), None);

        publisher.publish(dec!(100));
        publisher.publish(dec!(101));
        publisher.publish(dec!(0));
        assert_eq!(cell.latest(), Some(dec!(101)));

        let mut reader = publisher.subscribe();
        publisher.publish(dec!(102));
        assert_eq!(reader.changed().await, Some(dec!(102)));

        drop(publisher);
        assert_eq!(reader.changed().await, None);
        assert_eq!(cell.latest(), Some(dec!(102)));
    }
}
