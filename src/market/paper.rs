//! Paper exchange - dry-run collaborator
//!
//! Accepts orders without touching a real venue, synthesizes ids and keeps
//! them resting until the latest price crosses their limit, at which point
//! they drop out of the open set exactly as a real fill would.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::price::PriceCell;
use super::ticker::PublicTicker;
use crate::grid::{GridError, GridExchange, GridOrderRequest, GridResult, OrderId, OrderSide};

/// Starting paper balances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_quote_balance")]
    pub quote_balance: Decimal,
    #[serde(default)]
    pub base_balance: Decimal,
    /// Fee charged on every simulated fill, as a fraction of notional
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Fill resting orders when the price crosses them
    #[serde(default = "default_simulate_fills")]
    pub simulate_fills: bool,
}

fn default_quote_balance() -> Decimal {
    dec!(10000)
}

fn default_fee_rate() -> Decimal {
    dec!(0.001)
}

fn default_simulate_fills() -> bool {
    true
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            quote_balance: default_quote_balance(),
            base_balance: Decimal::ZERO,
            fee_rate: default_fee_rate(),
            simulate_fills: default_simulate_fills(),
        }
    }
}

#[derive(Debug)]
struct PaperBook {
    resting: HashMap<OrderId, GridOrderRequest>,
    quote: Decimal,
    base: Decimal,
    fills: u64,
}

impl PaperBook {
    fn apply_fill(&mut self, order: &GridOrderRequest, fee_rate: Decimal) {
        let notional = order.price * order.quantity;
        let fee = notional * fee_rate;
        match order.side {
            OrderSide::Buy => {
                self.quote -= notional + fee;
                self.base += order.quantity;
            }
            OrderSide::Sell => {
                self.quote += notional - fee;
                self.base -= order.quantity;
            }
        }
        self.fills += 1;
    }
}

pub struct PaperExchange {
    config: PaperConfig,
    prices: PriceCell,
    ticker: Option<PublicTicker>,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(config: PaperConfig, prices: PriceCell, ticker: Option<PublicTicker>) -> Self {
        let book = PaperBook {
            resting: HashMap::new(),
            quote: config.quote_balance,
            base: config.base_balance,
            fills: 0,
        };
        Self {
            config,
            prices,
            ticker,
            book: Mutex::new(book),
        }
    }

    async fn last_price(&self, symbol: &str) -> GridResult<Decimal> {
        if let Some(price) = self.prices.latest() {
            return Ok(price);
        }
        match &self.ticker {
            Some(ticker) => ticker.last_price(symbol).await,
            None => Err(GridError::PriceUnavailable(format!(
                "no price published for {}",
                symbol
            ))),
        }
    }

    /// Fill every resting order the price has crossed
    async fn match_orders(&self, price: Decimal) {
        let mut book = self.book.lock().await;
        let crossed: Vec<OrderId> = book
            .resting
            .iter()
            .filter(|(_, o)| match o.side {
                OrderSide::Buy => price <= o.price,
                OrderSide::Sell => price >= o.price,
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in crossed {
            if let Some(order) = book.resting.remove(&id) {
                book.apply_fill(&order, self.config.fee_rate);
                info!(
                    "[PAPER] Filled {} {} {} @ {} (last {})",
                    id, order.side, order.quantity, order.price, price
                );
            }
        }
    }

    /// (quote, base, simulated fills)
    pub async fn balances(&self) -> (Decimal, Decimal, u64) {
        let book = self.book.lock().await;
        (book.quote, book.base, book.fills)
    }
}

#[async_trait]
impl GridExchange for PaperExchange {
    async fn get_open_order_ids(&self, symbol: &str) -> GridResult<HashSet<OrderId>> {
        if self.config.simulate_fills {
            if let Ok(price) = self.last_price(symbol).await {
                self.match_orders(price).await;
            }
        }
        Ok(self.book.lock().await.resting.keys().cloned().collect())
    }

    async fn place_limit_order(&self, symbol: &str, order: &GridOrderRequest) -> GridResult<OrderId> {
        if order.price <= Decimal::ZERO || order.quantity <= Decimal::ZERO {
            return Err(GridError::Rejected(format!(
                "invalid order {} x {}",
                order.price, order.quantity
            )));
        }
        let id = OrderId::new(format!("dry-{}", Uuid::new_v4()));
        debug!(
            "[PAPER] {} {} {} @ {} -> {}",
            symbol, order.side, order.quantity, order.price, id
        );
        self.book.lock().await.resting.insert(id.clone(), order.clone());
        Ok(id)
    }

    async fn cancel_order(&self, _symbol: &str, id: &OrderId) -> GridResult<()> {
        match self.book.lock().await.resting.remove(id) {
            Some(_) => Ok(()),
            None => Err(GridError::Rejected(format!("order {} is not resting", id))),
        }
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> GridResult<Vec<OrderId>> {
        let mut book = self.book.lock().await;
        Ok(book.resting.drain().map(|(id, _)| id).collect())
    }

    async fn get_current_price(&self, symbol: &str) -> GridResult<Decimal> {
        self.last_price(symbol).await
    }

    async fn get_account_value(&self, _symbol: &str, mark_price: Decimal) -> GridResult<Decimal> {
        let book = self.book.lock().await;
        Ok(book.quote + book.base * mark_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::price_channel;

    #[tokio::test]
    async fn test_paper_fills_when_price_crosses() {
        let (publisher, cell) = price_channel();
        let exchange = PaperExchange::new(PaperConfig::default(), cell, None);
        publisher.publish(dec!(100));

        let buy = GridOrderRequest::new(0, dec!(95), dec!(1), OrderSide::Buy);
        let sell = GridOrderRequest::new(2, dec!(105), dec!(1), OrderSide::Sell);
        let buy_id = exchange.place_limit_order("SOL_USDC", &buy).await.unwrap();
        let sell_id = exchange.place_limit_order("SOL_USDC", &sell).await.unwrap();
        assert!(buy_id.as_str().starts_with("dry-"));

        let open = exchange.get_open_order_ids("SOL_USDC").await.unwrap();
        assert_eq!(open.len(), 2);

        publisher.publish(dec!(95));
        let open = exchange.get_open_order_ids("SOL_USDC").await.unwrap();
        assert!(!open.contains(&buy_id));
        assert!(open.contains(&sell_id));

        let (quote, base, fills) = exchange.balances().await;
        assert_eq!(fills, 1);
        assert_eq!(base, dec!(1));
        assert_eq!(quote, dec!(10000) - dec!(95) - dec!(0.095));

        let value = exchange.get_account_value("SOL_USDC", dec!(95)).await.unwrap();
        assert_eq!(value, dec!(9999.905));
    }

    #[tokio::test]
    async fn test_paper_cancel_and_price() {
        let (publisher, cell) = price_channel();
        let exchange = PaperExchange::new(PaperConfig::default(), cell, None);

        assert!(matches!(
            exchange.get_current_price("SOL_USDC").await,
            Err(GridError::PriceUnavailable(_))
        ));
        publisher.publish(dec!(100));
        assert_eq!(exchange.get_current_price("SOL_USDC").await.unwrap(), dec!(100));

        let order = GridOrderRequest::new(0, dec!(95), dec!(1), OrderSide::Buy);
        let id = exchange.place_limit_order("SOL_USDC", &order).await.unwrap();
        exchange.cancel_order("SOL_USDC", &id).await.unwrap();
        assert!(exchange.cancel_order("SOL_USDC", &id).await.is_err());

        exchange.place_limit_order("SOL_USDC", &order).await.unwrap();
        assert_eq!(exchange.cancel_all_orders("SOL_USDC").await.unwrap().len(), 1);
        assert!(exchange.get_open_order_ids("SOL_USDC").await.unwrap().is_empty());
    }
}
