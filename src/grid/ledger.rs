//! Order ledger - the engine's record of what is resting where

use std::collections::HashMap;

use chrono::Utc;
use log::{debug, warn};
use rust_decimal::Decimal;

use super::errors::{GridError, GridResult};
use super::types::{LedgerStatistics, Order, OrderId, OrderSide, OrderStatus};

/// In-memory order ledger.
///
/// Every order stays in `orders` for history. The per-side price indexes
/// only hold ids of orders that are currently `Open`.
#[derive(Debug, Default)]
pub struct OrderLedger {
    orders: HashMap<OrderId, Order>,
    buy_index: HashMap<Decimal, OrderId>,
    sell_index: HashMap<Decimal, OrderId>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, side: OrderSide) -> &HashMap<Decimal, OrderId> {
        match side {
            OrderSide::Buy => &self.buy_index,
            OrderSide::Sell => &self.sell_index,
        }
    }

    fn index_mut(&mut self, side: OrderSide) -> &mut HashMap<Decimal, OrderId> {
        match side {
            OrderSide::Buy => &mut self.buy_index,
            OrderSide::Sell => &mut self.sell_index,
        }
    }

    /// Drop the index entry for `order`, but only if it still points at this id
    fn unindex(&mut self, side: OrderSide, price: Decimal, id: &OrderId) {
        let index = self.index_mut(side);
        if index.get(&price) == Some(id) {
            index.remove(&price);
        }
    }

    /// Record a newly placed order. An existing record with the same id is overwritten.
    ///
    /// A price level held by a different open order is refused and the ledger
    /// is left untouched, so an index entry always belongs to an open order.
    pub fn add(
        &mut self,
        id: OrderId,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> GridResult<&Order> {
        if let Some(holder) = self.index(side).get(&price) {
            if *holder != id {
                return Err(GridError::LevelOccupied {
                    side,
                    price,
                    holder: holder.clone(),
                });
            }
        }

        if let Some(previous) = self.orders.get(&id) {
            warn!(
                "Order {} already in ledger ({} @ {}, {:?}), overwriting",
                id, previous.side, previous.price, previous.status
            );
            if previous.is_open() {
                let (prev_side, prev_price) = (previous.side, previous.price);
                self.unindex(prev_side, prev_price, &id);
            }
        }

        self.index_mut(side).insert(price, id.clone());
        let order = Order::new(id.clone(), side, price, quantity);
        debug!("Ledger add: {} {} @ {} x {}", id, side, price, quantity);
        self.orders.insert(id.clone(), order);
        Ok(&self.orders[&id])
    }

    fn close(&mut self, id: &OrderId, status: OrderStatus) -> GridResult<&Order> {
        let order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| GridError::OrderNotFound(id.clone()))?;

        if order.status.is_terminal() {
            return Err(GridError::OrderNotOpen {
                id: id.clone(),
                status: order.status,
            });
        }

        order.status = status;
        if status == OrderStatus::Filled {
            order.filled_at = Some(Utc::now());
        }
        let (side, price) = (order.side, order.price);
        self.unindex(side, price, id);

        Ok(&self.orders[id])
    }

    /// `Open -> Filled`; stamps `filled_at` and frees the price level
    pub fn mark_filled(&mut self, id: &OrderId) -> GridResult<&Order> {
        self.close(id, OrderStatus::Filled)
    }

    /// `Open -> Cancelled`; frees the price level
    pub fn mark_cancelled(&mut self, id: &OrderId) -> GridResult<&Order> {
        self.close(id, OrderStatus::Cancelled)
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn has_order_at_price(&self, price: Decimal, side: OrderSide) -> bool {
        self.index(side).contains_key(&price)
    }

    pub fn order_at_price(&self, price: Decimal, side: OrderSide) -> Option<&Order> {
        self.index(side).get(&price).and_then(|id| self.orders.get(id))
    }

    pub fn open_orders(&self) -> Vec<&Order> {
        self.orders.values().filter(|o| o.is_open()).collect()
    }

    pub fn filled_orders(&self) -> Vec<&Order> {
        self.orders
            .values()
            .filter(|o| o.status == OrderStatus::Filled)
            .collect()
    }

    /// Prices of open orders on one side, ascending
    pub fn open_prices(&self, side: OrderSide) -> Vec<Decimal> {
        let mut prices: Vec<Decimal> = self.index(side).keys().copied().collect();
        prices.sort();
        prices
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn statistics(&self) -> LedgerStatistics {
        let mut stats = LedgerStatistics {
            total: self.orders.len(),
            ..Default::default()
        };
        for order in self.orders.values() {
            match (order.status, order.side) {
                (OrderStatus::Open, OrderSide::Buy) => stats.open_buys += 1,
                (OrderStatus::Open, OrderSide::Sell) => stats.open_sells += 1,
                (OrderStatus::Filled, OrderSide::Buy) => stats.filled_buys += 1,
                (OrderStatus::Filled, OrderSide::Sell) => stats.filled_sells += 1,
                (OrderStatus::Cancelled, _) => stats.cancelled += 1,
            }
        }
        stats.open = stats.open_buys + stats.open_sells;
        stats.filled = stats.filled_buys + stats.filled_sells;
        stats
    }
}
