//! Worker pool draining the opportunity queue
//!
//! Workers pull deliveries off the shared channel and drive them through the
//! executors. Failures are classified: retryable errors go back to the queue
//! with a bumped attempt count, circuit rejections are requeued without
//! consuming retry budget, and everything else (or an exhausted budget) is
//! parked in the dead-letter store. On shutdown each worker finishes its
//! current item before exiting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::common::traits::TradeStore;
use crate::engine::types::Opportunity;
use crate::executor::buy::BuyExecutor;
use crate::executor::sell::SellExecutor;
use crate::queue::{Delivery, OpportunityQueue};

/// Pause before requeueing a delivery rejected by the open circuit
const CIRCUIT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Worker pool configuration and shared handles
pub struct WorkerPool {
    queue: Arc<dyn OpportunityQueue>,
    receiver: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    buy_executor: Arc<BuyExecutor>,
    sell_executor: Arc<SellExecutor>,
    store: Arc<dyn TradeStore>,
    max_attempts: u32,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn OpportunityQueue>,
        receiver: mpsc::Receiver<Delivery>,
        buy_executor: Arc<BuyExecutor>,
        sell_executor: Arc<SellExecutor>,
        store: Arc<dyn TradeStore>,
        max_attempts: u32,
    ) -> Self {
        Self {
            queue,
            receiver: Arc::new(Mutex::new(receiver)),
            buy_executor,
            sell_executor,
            store,
            max_attempts,
        }
    }

    /// Spawn `concurrency` workers; they stop when `shutdown` fires or the
    /// queue closes
    pub fn spawn(
        self: Arc<Self>,
        concurrency: u32,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        (0..concurrency)
            .map(|worker_id| {
                let pool = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_worker(worker_id, shutdown).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: u32, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id, "worker started");
        loop {
            let delivery = {
                let mut receiver = self.receiver.lock().await;
                tokio::select! {
                    _ = shutdown.changed() => break,
                    delivery = receiver.recv() => match delivery {
                        Some(delivery) => delivery,
                        None => break,
                    },
                }
            };
            // The receiver lock is dropped here, so a shutdown signal never
            // interrupts the item in progress
            self.handle(delivery).await;
        }
        info!(worker_id, "worker stopped");
    }

    async fn handle(&self, delivery: Delivery) {
        let sale_id = delivery.opportunity.sale_id().to_string();
        let kind = delivery.opportunity.kind();
        debug!(kind, %sale_id, attempt = delivery.attempt, "processing delivery");

        let result = match &delivery.opportunity {
            Opportunity::Buy(opportunity) => self.buy_executor.execute(opportunity).await,
            Opportunity::Sell(opportunity) => self.sell_executor.execute(opportunity).await,
        };

        let error = match result {
            Ok(()) => return,
            Err(error) => error,
        };

        if !error.consumes_retry_budget() {
            // Circuit open: requeue the same attempt after a pause
            debug!(kind, %sale_id, "circuit open, requeueing without consuming retry budget");
            sleep(CIRCUIT_RETRY_DELAY).await;
            if let Err(send_error) = self.queue.redeliver(delivery.clone()).await {
                self.dead_letter(&delivery, &send_error.to_string()).await;
            }
            return;
        }

        if error.is_retryable() && delivery.attempt < self.max_attempts {
            let next = Delivery {
                opportunity: delivery.opportunity.clone(),
                attempt: delivery.attempt + 1,
            };
            warn!(
                kind,
                %sale_id,
                attempt = delivery.attempt,
                error = %error,
                "delivery failed, requeueing"
            );
            sleep(Self::retry_delay(delivery.attempt)).await;
            if let Err(send_error) = self.queue.redeliver(next).await {
                self.dead_letter(&delivery, &send_error.to_string()).await;
            }
            return;
        }

        self.dead_letter(&delivery, &error.to_string()).await;
    }

    /// Linear backoff between redeliveries; the queue contract only asks
    /// for bounded retries, not a particular curve
    fn retry_delay(attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt))
    }

    /// Park an opportunity for manual inspection; never silently dropped
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) {
        error!(
            kind = delivery.opportunity.kind(),
            sale_id = %delivery.opportunity.sale_id(),
            attempt = delivery.attempt,
            reason,
            "moving delivery to dead letters"
        );
        let payload = serde_json::to_string(&delivery.opportunity)
            .unwrap_or_else(|_| format!("{:?}", delivery.opportunity));
        if let Err(db_error) = self
            .store
            .insert_dead_letter(&payload, reason, delivery.attempt)
            .await
        {
            error!(error = %db_error, "failed to record dead letter");
        }
        // A sell that exhausted its retries leaves the position in a state
        // the engine will not touch again without operator intervention
        if let Opportunity::Sell(opportunity) = &delivery.opportunity {
            if let Err(db_error) = self.store.mark_failed(&opportunity.sale_id).await {
                error!(error = %db_error, "failed to mark position failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::EngineError;
    use crate::common::traits::{MockMarketApi, MockTradeStore};
    use crate::common::types::{BuyOutcome, Tier};
    use crate::config::types::BudgetConfig;
    use crate::engine::ledger::BudgetLedger;
    use crate::engine::types::BuyOpportunity;
    use crate::queue::InMemoryQueue;
    use rust_decimal_macros::dec;

    fn opportunity() -> Opportunity {
        Opportunity::Buy(BuyOpportunity {
            sale_id: "sale-1".to_string(),
            item_name: "chrome falchion".to_string(),
            price: dec!(28.00),
            target_sell_price: dec!(36.24),
            expected_profit: dec!(2.80),
            risk_score: 2.0,
            tier: Tier::One,
            discount_pct: dec!(21.13),
            spread_pct: None,
        })
    }

    fn ledger() -> Arc<BudgetLedger> {
        let ledger = BudgetLedger::new(BudgetConfig {
            hard_floor: dec!(50),
            soft_floor: dec!(100),
            max_risk_per_trade: dec!(0.20),
            max_total_exposure: dec!(0.90),
            min_reserve_pct: dec!(0.10),
        });
        ledger.set_balance(dec!(1000));
        Arc::new(ledger)
    }

    fn pool(
        api: MockMarketApi,
        store: MockTradeStore,
        queue: Arc<InMemoryQueue>,
        receiver: mpsc::Receiver<Delivery>,
        max_attempts: u32,
    ) -> WorkerPool {
        let api: Arc<dyn crate::common::traits::MarketApi> = Arc::new(api);
        let store: Arc<dyn TradeStore> = Arc::new(store);
        let ledger = ledger();
        WorkerPool::new(
            queue,
            receiver,
            Arc::new(BuyExecutor::new(
                Arc::clone(&api),
                Arc::clone(&store),
                Arc::clone(&ledger),
            )),
            Arc::new(SellExecutor::new(Arc::clone(&api), Arc::clone(&store))),
            store,
            max_attempts,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_is_redelivered_with_bumped_attempt() {
        let mut api = MockMarketApi::new();
        api.expect_buy_items().returning(|_| {
            Err(EngineError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            })
        });
        let mut store = MockTradeStore::new();
        store.expect_insert_transaction().returning(|_| Ok(()));

        let (queue, mut receiver) = InMemoryQueue::channel(8);
        let queue = Arc::new(queue);
        let (_tx, rx) = mpsc::channel(8);
        let pool = pool(api, store, Arc::clone(&queue), rx, 3);

        pool.handle(Delivery {
            opportunity: opportunity(),
            attempt: 1,
        })
        .await;

        let redelivered = receiver.recv().await.unwrap();
        assert_eq!(redelivered.attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_go_to_dead_letters() {
        let mut api = MockMarketApi::new();
        api.expect_buy_items().returning(|_| {
            Err(EngineError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            })
        });
        let mut store = MockTradeStore::new();
        store.expect_insert_transaction().returning(|_| Ok(()));
        store
            .expect_insert_dead_letter()
            .withf(|payload, reason, attempts| {
                payload.contains("sale-1") && reason.contains("502") && *attempts == 3
            })
            .returning(|_, _, _| Ok(()));

        let (queue, mut receiver) = InMemoryQueue::channel(8);
        let queue = Arc::new(queue);
        let (_tx, rx) = mpsc::channel(8);
        let pool = pool(api, store, Arc::clone(&queue), rx, 3);

        pool.handle(Delivery {
            opportunity: opportunity(),
            attempt: 3,
        })
        .await;

        // Nothing was requeued
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_open_requeues_same_attempt() {
        let mut api = MockMarketApi::new();
        api.expect_buy_items()
            .returning(|_| Err(EngineError::CircuitOpen { failure_count: 10 }));
        let store = MockTradeStore::new();

        let (queue, mut receiver) = InMemoryQueue::channel(8);
        let queue = Arc::new(queue);
        let (_tx, rx) = mpsc::channel(8);
        let pool = pool(api, store, Arc::clone(&queue), rx, 3);

        pool.handle(Delivery {
            opportunity: opportunity(),
            attempt: 3,
        })
        .await;

        // Attempt count unchanged even though the retry budget was spent
        let redelivered = receiver.recv().await.unwrap();
        assert_eq!(redelivered.attempt, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_delivery_completes() {
        let mut api = MockMarketApi::new();
        api.expect_buy_items().returning(|ids| {
            Ok(BuyOutcome {
                purchased_ids: ids.to_vec(),
                total_price: dec!(28.00),
            })
        });
        let mut store = MockTradeStore::new();
        store.expect_insert_position().returning(|_| Ok(()));
        store.expect_insert_transaction().returning(|_| Ok(()));

        let (queue, mut receiver) = InMemoryQueue::channel(8);
        let queue = Arc::new(queue);
        let (_tx, rx) = mpsc::channel(8);
        let pool = pool(api, store, Arc::clone(&queue), rx, 3);

        pool.handle(Delivery {
            opportunity: opportunity(),
            attempt: 1,
        })
        .await;

        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_workers_drain_and_stop_on_shutdown() {
        let mut api = MockMarketApi::new();
        api.expect_buy_items().returning(|ids| {
            Ok(BuyOutcome {
                purchased_ids: ids.to_vec(),
                total_price: dec!(28.00),
            })
        });
        let mut store = MockTradeStore::new();
        store.expect_insert_position().returning(|_| Ok(()));
        store.expect_insert_transaction().returning(|_| Ok(()));

        let (queue, receiver) = InMemoryQueue::channel(8);
        let queue = Arc::new(queue);
        queue.publish(opportunity()).await.unwrap();

        let pool = Arc::new(pool_from_parts(api, store, Arc::clone(&queue), receiver));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = Arc::clone(&pool).spawn(2, shutdown_rx);

        // Give the workers a moment to drain, then stop them
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    fn pool_from_parts(
        api: MockMarketApi,
        store: MockTradeStore,
        queue: Arc<InMemoryQueue>,
        receiver: mpsc::Receiver<Delivery>,
    ) -> WorkerPool {
        pool(api, store, queue, receiver, 3)
    }
}
