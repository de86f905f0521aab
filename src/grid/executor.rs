//! Exchange abstraction for grid trading - enables mocking for tests

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};

use super::errors::{GridError, GridResult};
use super::types::{GridOrderRequest, OrderId};

/// Exchange operations trait - can be mocked for testing
#[async_trait]
pub trait GridExchange: Send + Sync {
    /// Snapshot of the ids of all orders currently resting on the exchange
    async fn get_open_order_ids(&self, symbol: &str) -> GridResult<HashSet<OrderId>>;

    /// Place a limit order, returning the exchange-assigned id
    async fn place_limit_order(&self, symbol: &str, order: &GridOrderRequest) -> GridResult<OrderId>;

    /// Cancel a single order
    async fn cancel_order(&self, symbol: &str, id: &OrderId) -> GridResult<()>;

    /// Bulk cancel all orders for a symbol, returning the cancelled ids
    async fn cancel_all_orders(&self, symbol: &str) -> GridResult<Vec<OrderId>>;

    /// Last traded price
    async fn get_current_price(&self, symbol: &str) -> GridResult<Decimal>;

    /// Total account value in quote currency, marked at `mark_price`
    async fn get_account_value(&self, symbol: &str, mark_price: Decimal) -> GridResult<Decimal>;
}

/// Runs exchange calls on the tokio runtime with a bounded number in flight
/// and a per-call timeout.
///
/// A call that times out is reported as a transport failure, but its task is
/// left to finish so a placement never ends up half-sent.
pub struct ExchangeGateway<E: GridExchange> {
    exchange: Arc<E>,
    permits: Arc<Semaphore>,
    call_timeout: Duration,
}

impl<E: GridExchange> Clone for ExchangeGateway<E> {
    fn clone(&self) -> Self {
        Self {
            exchange: self.exchange.clone(),
            permits: self.permits.clone(),
            call_timeout: self.call_timeout,
        }
    }
}

impl<E: GridExchange + 'static> ExchangeGateway<E> {
    pub fn new(exchange: Arc<E>, max_in_flight: usize, call_timeout: Duration) -> Self {
        Self {
            exchange,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            call_timeout,
        }
    }

    async fn dispatch<T, F, Fut>(&self, operation: &'static str, call: F) -> GridResult<T>
    where
        F: FnOnce(Arc<E>) -> Fut,
        Fut: Future<Output = GridResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        // One deadline covers both the wait for a permit and the call itself
        let deadline = Instant::now() + self.call_timeout;
        let permit = match timeout_at(deadline, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(GridError::Transport("exchange worker pool closed".into()))
            }
            Err(_) => return Err(self.timed_out(operation, "waiting for a free slot")),
        };

        let fut = call(self.exchange.clone());
        let handle = tokio::spawn(async move {
            let result = fut.await;
            drop(permit);
            result
        });

        match timeout_at(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(GridError::Transport(format!(
                "{} task failed: {}",
                operation, join_err
            ))),
            Err(_) => {
                debug!("{} still running after timeout, left to complete", operation);
                Err(self.timed_out(operation, "in flight"))
            }
        }
    }

    fn timed_out(&self, operation: &str, stage: &str) -> GridError {
        GridError::Transport(format!(
            "{} timed out after {}ms ({})",
            operation,
            self.call_timeout.as_millis(),
            stage
        ))
    }

    pub async fn get_open_order_ids(&self, symbol: &str) -> GridResult<HashSet<OrderId>> {
        let symbol = symbol.to_string();
        self.dispatch("get_open_order_ids", move |ex| async move {
            ex.get_open_order_ids(&symbol).await
        })
        .await
    }

    pub async fn place_limit_order(
        &self,
        symbol: &str,
        order: &GridOrderRequest,
    ) -> GridResult<OrderId> {
        let symbol = symbol.to_string();
        let order = order.clone();
        self.dispatch("place_limit_order", move |ex| async move {
            ex.place_limit_order(&symbol, &order).await
        })
        .await
    }

    pub async fn cancel_order(&self, symbol: &str, id: &OrderId) -> GridResult<()> {
        let symbol = symbol.to_string();
        let id = id.clone();
        self.dispatch("cancel_order", move |ex| async move {
            ex.cancel_order(&symbol, &id).await
        })
        .await
    }

    pub async fn cancel_all_orders(&self, symbol: &str) -> GridResult<Vec<OrderId>> {
        let symbol = symbol.to_string();
        self.dispatch("cancel_all_orders", move |ex| async move {
            ex.cancel_all_orders(&symbol).await
        })
        .await
    }

    pub async fn get_current_price(&self, symbol: &str) -> GridResult<Decimal> {
        let symbol = symbol.to_string();
        self.dispatch("get_current_price", move |ex| async move {
            ex.get_current_price(&symbol).await
        })
        .await
    }

    pub async fn get_account_value(&self, symbol: &str, mark_price: Decimal) -> GridResult<Decimal> {
        let symbol = symbol.to_string();
        self.dispatch("get_account_value", move |ex| async move {
            ex.get_account_value(&symbol, mark_price).await
        })
        .await
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Mock exchange for testing grid bots without a real exchange connection.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::Mutex;

    /// Mock exchange for testing
    pub struct MockExchange {
        /// Orders currently resting, by id
        pub resting: Arc<Mutex<HashMap<OrderId, GridOrderRequest>>>,
        /// Every successful placement, in order
        pub placed: Arc<Mutex<Vec<GridOrderRequest>>>,
        pub cancelled_ids: Arc<Mutex<Vec<OrderId>>>,
        pub price: Arc<Mutex<Decimal>>,
        pub account_value: Arc<Mutex<Decimal>>,
        next_id: AtomicU64,
        pub should_fail: Arc<Mutex<bool>>,
        /// Placements at these prices fail
        pub fail_prices: Arc<Mutex<HashSet<Decimal>>>,
        pub fail_snapshot: Arc<Mutex<bool>>,
        pub fail_cancel_all: Arc<Mutex<bool>>,
        /// Artificial latency applied to every call
        pub delay: Arc<Mutex<Option<Duration>>>,
    }

    impl MockExchange {
        pub fn new(price: Decimal) -> Self {
            Self {
                resting: Arc::new(Mutex::new(HashMap::new())),
                placed: Arc::new(Mutex::new(Vec::new())),
                cancelled_ids: Arc::new(Mutex::new(Vec::new())),
                price: Arc::new(Mutex::new(price)),
                account_value: Arc::new(Mutex::new(Decimal::from(10_000))),
                next_id: AtomicU64::new(1),
                should_fail: Arc::new(Mutex::new(false)),
                fail_prices: Arc::new(Mutex::new(HashSet::new())),
                fail_snapshot: Arc::new(Mutex::new(false)),
                fail_cancel_all: Arc::new(Mutex::new(false)),
                delay: Arc::new(Mutex::new(None)),
            }
        }

        pub async fn set_price(&self, price: Decimal) {
            *self.price.lock().await = price;
        }

        pub async fn set_account_value(&self, value: Decimal) {
            *self.account_value.lock().await = value;
        }

        pub async fn set_should_fail(&self, fail: bool) {
            *self.should_fail.lock().await = fail;
        }

        pub async fn fail_at_price(&self, price: Decimal) {
            self.fail_prices.lock().await.insert(price);
        }

        pub async fn set_fail_snapshot(&self, fail: bool) {
            *self.fail_snapshot.lock().await = fail;
        }

        pub async fn set_fail_cancel_all(&self, fail: bool) {
            *self.fail_cancel_all.lock().await = fail;
        }

        pub async fn set_delay(&self, delay: Option<Duration>) {
            *self.delay.lock().await = delay;
        }

        /// Simulate a fill: the order disappears from the open set
        pub async fn fill(&self, id: &OrderId) -> Option<GridOrderRequest> {
            self.resting.lock().await.remove(id)
        }

        /// Id of the resting order at `price`, if any
        pub async fn id_at_price(&self, price: Decimal) -> Option<OrderId> {
            self.resting
                .lock()
                .await
                .iter()
                .find(|(_, o)| o.price == price)
                .map(|(id, _)| id.clone())
        }

        pub async fn placed_count(&self) -> usize {
            self.placed.lock().await.len()
        }

        async fn latency(&self) {
            let delay = *self.delay.lock().await;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl GridExchange for MockExchange {
        async fn get_open_order_ids(&self, _symbol: &str) -> GridResult<HashSet<OrderId>> {
            self.latency().await;
            if *self.fail_snapshot.lock().await {
                return Err(GridError::Transport("Mock snapshot failure".into()));
            }
            Ok(self.resting.lock().await.keys().cloned().collect())
        }

        async fn place_limit_order(&self, _symbol: &str, order: &GridOrderRequest) -> GridResult<OrderId> {
            self.latency().await;
            if *self.should_fail.lock().await {
                return Err(GridError::Transport("Mock failure".into()));
            }
            if self.fail_prices.lock().await.contains(&order.price) {
                return Err(GridError::Rejected(format!("Mock rejection at {}", order.price)));
            }

            let id = OrderId::new(format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
            self.placed.lock().await.push(order.clone());
            self.resting.lock().await.insert(id.clone(), order.clone());
            Ok(id)
        }

        async fn cancel_order(&self, _symbol: &str, id: &OrderId) -> GridResult<()> {
            self.latency().await;
            if *self.should_fail.lock().await {
                return Err(GridError::Transport("Mock failure".into()));
            }
            self.resting.lock().await.remove(id);
            self.cancelled_ids.lock().await.push(id.clone());
            Ok(())
        }

        async fn cancel_all_orders(&self, _symbol: &str) -> GridResult<Vec<OrderId>> {
            self.latency().await;
            if *self.fail_cancel_all.lock().await {
                return Err(GridError::Transport("Mock bulk cancel failure".into()));
            }
            let ids: Vec<OrderId> = self.resting.lock().await.drain().map(|(id, _)| id).collect();
            self.cancelled_ids.lock().await.extend(ids.iter().cloned());
            Ok(ids)
        }

        async fn get_current_price(&self, _symbol: &str) -> GridResult<Decimal> {
            self.latency().await;
            Ok(*self.price.lock().await)
        }

        async fn get_account_value(&self, _symbol: &str, _mark_price: Decimal) -> GridResult<Decimal> {
            self.latency().await;
            Ok(*self.account_value.lock().await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockExchange;
    use super::*;
    use crate::grid::types::OrderSide;
    use rust_decimal_macros::dec;

    fn gateway(exchange: Arc<MockExchange>, timeout_ms: u64) -> ExchangeGateway<MockExchange> {
        ExchangeGateway::new(exchange, 2, Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_gateway_forwards_calls() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        let gateway = gateway(exchange.clone(), 1_000);

        let order = GridOrderRequest::new(0, dec!(95), dec!(1), OrderSide::Buy);
        let id = gateway.place_limit_order("SOL_USDC", &order).await.unwrap();

        let open = gateway.get_open_order_ids("SOL_USDC").await.unwrap();
        assert!(open.contains(&id));
        assert_eq!(gateway.get_current_price("SOL_USDC").await.unwrap(), dec!(100));

        gateway.cancel_order("SOL_USDC", &id).await.unwrap();
        assert!(gateway.get_open_order_ids("SOL_USDC").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_timeout_is_transport_error() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        exchange.set_delay(Some(Duration::from_millis(200))).await;
        let gateway = gateway(exchange.clone(), 20);

        let order = GridOrderRequest::new(0, dec!(95), dec!(1), OrderSide::Buy);
        let err = gateway.place_limit_order("SOL_USDC", &order).await.unwrap_err();
        assert!(matches!(err, GridError::Transport(ref msg) if msg.contains("timed out")));
        assert!(err.is_transport());

        // The in-flight call still completes
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(exchange.placed_count().await, 1);
    }

    #[tokio::test]
    async fn test_gateway_propagates_failures() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        exchange.set_fail_snapshot(true).await;
        let gateway = gateway(exchange, 1_000);

        assert!(matches!(
            gateway.get_open_order_ids("SOL_USDC").await,
            Err(GridError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_gateway_propagates_placement_and_cancel_failures() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        let gateway = gateway(exchange.clone(), 1_000);
        let order = GridOrderRequest::new(0, dec!(95), dec!(1), OrderSide::Buy);
        let id = gateway.place_limit_order("SOL_USDC", &order).await.unwrap();

        exchange.set_should_fail(true).await;
        assert!(gateway.place_limit_order("SOL_USDC", &order).await.is_err());
        assert!(gateway.cancel_order("SOL_USDC", &id).await.is_err());
        assert_eq!(exchange.placed_count().await, 1);

        exchange.set_should_fail(false).await;
        gateway.cancel_order("SOL_USDC", &id).await.unwrap();
    }

    #[tokio::test]
    async fn test_gateway_slot_wait_is_bounded_by_timeout() {
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        exchange.set_delay(Some(Duration::from_secs(3))).await;
        let gateway = ExchangeGateway::new(exchange.clone(), 1, Duration::from_millis(50));

        let order = GridOrderRequest::new(0, dec!(95), dec!(1), OrderSide::Buy);
        assert!(gateway.place_limit_order("SOL_USDC", &order).await.is_err());

        // The only slot is still held by the hung placement
        let started = Instant::now();
        let err = gateway.get_open_order_ids("SOL_USDC").await.unwrap_err();
        let waited = started.elapsed();
        assert!(waited < Duration::from_secs(1), "second call blocked {:?}", waited);
        assert!(matches!(err, GridError::Transport(ref msg) if msg.contains("timed out")));
    }
}
