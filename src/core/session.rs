//! Call session lifecycle.
//!
//! A session is the per-call action queue, named after the session id. It
//! is opened on the first event of a call and removed on the terminal
//! hangup.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::adapters::{ActionQueue, QueueAttributes, QueueError};
use crate::domain::{QueueRef, SessionId};

use super::error::BridgeError;

/// An open call session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub id: SessionId,
    pub queue: QueueRef,
}

/// Opens and closes call sessions on an [`ActionQueue`]
pub struct SessionManager {
    queue: Arc<dyn ActionQueue>,
    attributes: QueueAttributes,
}

impl SessionManager {
    pub fn new(queue: Arc<dyn ActionQueue>, attributes: QueueAttributes) -> Self {
        Self { queue, attributes }
    }

    /// Create the session's queue; reopening an existing session returns its handle
    #[instrument(skip(self), fields(backend = self.queue.name()))]
    pub async fn create_session(&self, session_id: &SessionId) -> Result<CallSession, BridgeError> {
        let queue = self
            .queue
            .create_queue(session_id.as_str(), &self.attributes)
            .await?;
        info!(%queue, "Session queue ready");

        Ok(CallSession {
            id: session_id.clone(),
            queue,
        })
    }

    /// Delete the session's queue; a queue that is already gone is not an error
    #[instrument(skip(self), fields(backend = self.queue.name()))]
    pub async fn destroy_session(&self, queue: &QueueRef) -> Result<(), BridgeError> {
        match self.queue.delete_queue(queue).await {
            Ok(()) => {
                info!("Session queue deleted");
                Ok(())
            }
            Err(QueueError::QueueNotFound(_)) => {
                warn!("Session queue was already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryActionQueue;

    #[tokio::test]
    async fn test_create_twice_returns_same_queue() {
        let backend = Arc::new(MemoryActionQueue::new());
        let sessions = SessionManager::new(backend.clone(), QueueAttributes::default());
        let id = SessionId::from_transaction("T1");

        let first = sessions.create_session(&id).await.unwrap();
        let second = sessions.create_session(&id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.queue_count(), 1);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let backend = Arc::new(MemoryActionQueue::new());
        let sessions = SessionManager::new(backend.clone(), QueueAttributes::default());
        let session = sessions
            .create_session(&SessionId::from_transaction("T1"))
            .await
            .unwrap();

        sessions.destroy_session(&session.queue).await.unwrap();
        sessions.destroy_session(&session.queue).await.unwrap();

        assert!(!backend.exists(&session.queue));
    }
}
