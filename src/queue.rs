//! Opportunity queue
//!
//! Accepted opportunities are published here and drained by the worker pool.
//! The contract is at-least-once delivery with bounded redelivery; after the
//! attempt budget is exhausted, the worker parks the opportunity in the
//! dead-letter store instead of dropping it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::common::errors::{EngineError, Result};
use crate::engine::types::Opportunity;

/// Default queue buffer size
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// One delivery of an opportunity to a worker
///
/// `attempt` starts at 1 and increments on every redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub opportunity: Opportunity,
    pub attempt: u32,
}

/// Publisher side of the opportunity queue
#[async_trait]
pub trait OpportunityQueue: Send + Sync {
    /// Enqueue a fresh opportunity
    async fn publish(&self, opportunity: Opportunity) -> Result<()>;

    /// Re-enqueue a failed delivery with its attempt count already bumped
    async fn redeliver(&self, delivery: Delivery) -> Result<()>;
}

/// In-process queue backed by a tokio channel
///
/// All workers share one runtime here, so a channel satisfies the delivery
/// contract; a durable broker would slot in behind the same trait.
#[derive(Debug, Clone)]
pub struct InMemoryQueue {
    sender: mpsc::Sender<Delivery>,
}

impl InMemoryQueue {
    /// Create the queue and the receiver handed to the worker pool
    pub fn channel(size: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (sender, receiver) = mpsc::channel(size);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl OpportunityQueue for InMemoryQueue {
    async fn publish(&self, opportunity: Opportunity) -> Result<()> {
        self.sender
            .send(Delivery {
                opportunity,
                attempt: 1,
            })
            .await
            .map_err(|e| EngineError::QueueSend(e.to_string()))
    }

    async fn redeliver(&self, delivery: Delivery) -> Result<()> {
        self.sender
            .send(delivery)
            .await
            .map_err(|e| EngineError::QueueSend(e.to_string()))
    }
}
