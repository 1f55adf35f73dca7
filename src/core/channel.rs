//! Next-action retrieval from a session queue.
//!
//! Receives exactly one message and acknowledges it before handing it to
//! the caller. Delivery is at-least-once: if the process dies between the
//! receive and the delete, the message becomes visible again after the
//! visibility window and the next invocation gets it a second time.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::adapters::{ActionQueue, QueueAttributes};
use crate::domain::{ActionBatch, QueueRef};

use super::error::BridgeError;

pub struct ActionChannel {
    queue: Arc<dyn ActionQueue>,
    attributes: QueueAttributes,
}

impl ActionChannel {
    pub fn new(queue: Arc<dyn ActionQueue>, attributes: QueueAttributes) -> Self {
        Self { queue, attributes }
    }

    /// Block for the next action batch the workflow posted for this call
    #[instrument(skip(self), fields(backend = self.queue.name()))]
    pub async fn await_next_action(&self, queue: &QueueRef) -> Result<ActionBatch, BridgeError> {
        debug!("Waiting for next action");

        let message = self
            .queue
            .receive_message(queue, self.attributes.visibility_timeout)
            .await?
            .ok_or_else(|| BridgeError::NoActionAvailable {
                queue: queue.to_string(),
            })?;

        self.queue
            .delete_message(queue, &message.receipt_handle)
            .await?;

        let payload = serde_json::from_str(&message.body)
            .map_err(|e| BridgeError::InvalidActionPayload(format!("{}: {}", message.message_id, e)))?;
        let batch = ActionBatch::from_value(payload);

        info!(
            message_id = %message.message_id,
            actions = batch.actions().map(|a| a.len()).unwrap_or(0),
            "Next action received"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryActionQueue;
    use std::time::Duration;

    fn quick() -> QueueAttributes {
        QueueAttributes {
            receive_wait: Duration::from_millis(30),
            visibility_timeout: Duration::from_secs(20),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let backend = Arc::new(MemoryActionQueue::new());
        let queue = backend.create_queue("q", &quick()).await.unwrap();
        let channel = ActionChannel::new(backend, quick());

        let result = channel.await_next_action(&queue).await;
        assert!(matches!(result, Err(BridgeError::NoActionAvailable { .. })));
    }

    #[tokio::test]
    async fn test_invalid_body_is_still_acknowledged() {
        let backend = Arc::new(MemoryActionQueue::new());
        let queue = backend.create_queue("q", &quick()).await.unwrap();
        backend.send_message(&queue, "not json").await.unwrap();
        let channel = ActionChannel::new(backend.clone(), quick());

        let result = channel.await_next_action(&queue).await;

        assert!(matches!(result, Err(BridgeError::InvalidActionPayload(_))));
        assert_eq!(backend.pending_count(&queue), 0);
        assert_eq!(backend.in_flight_count(&queue), 0);
    }
}
