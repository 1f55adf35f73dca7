//! In-process queue and workflow engine.
//!
//! Both keep their state behind a mutex and never hold it across an await.
//! Useful for tests and for embedding the router next to a workflow runtime
//! living in the same process.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use super::{
    ActionQueue, QueueAttributes, QueueError, ReceivedMessage, SignalRecord, TaskOutcome,
    WorkflowEngine, WorkflowError,
};
use crate::domain::{CallFlowRef, QueueRef, WaitToken};

const MEMORY_SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
}

#[derive(Debug)]
struct InFlight {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Debug)]
struct QueueState {
    attributes: QueueAttributes,
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, InFlight>,
}

impl QueueState {
    fn new(attributes: QueueAttributes) -> Self {
        Self {
            attributes,
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Move deliveries whose visibility window lapsed back to the front
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            if let Some(flight) = self.in_flight.remove(&handle) {
                self.ready.push_front(flight.message);
            }
        }
    }

    fn next_redelivery(&self) -> Option<Instant> {
        self.in_flight.values().map(|f| f.visible_at).min()
    }
}

/// In-memory [`ActionQueue`] with long polling and visibility timeouts
#[derive(Default)]
pub struct MemoryActionQueue {
    queues: Mutex<HashMap<QueueRef, QueueState>>,
    notify: Notify,
}

impl MemoryActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle a queue named `name` gets
    pub fn queue_ref_for(name: &str) -> QueueRef {
        QueueRef::new(format!("{}{}", MEMORY_SCHEME, name))
    }

    pub fn exists(&self, queue: &QueueRef) -> bool {
        self.lock().contains_key(queue)
    }

    /// Messages waiting to be received (excludes in-flight deliveries)
    pub fn pending_count(&self, queue: &QueueRef) -> usize {
        self.lock().get(queue).map(|q| q.ready.len()).unwrap_or(0)
    }

    /// Deliveries received but not yet acknowledged
    pub fn in_flight_count(&self, queue: &QueueRef) -> usize {
        self.lock().get(queue).map(|q| q.in_flight.len()).unwrap_or(0)
    }

    pub fn queue_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<QueueRef, QueueState>> {
        // A poisoned lock only means a test thread panicked; the map is still usable.
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_receive(
        &self,
        queue: &QueueRef,
        visibility_timeout: Duration,
    ) -> Result<(Option<ReceivedMessage>, Option<Instant>), QueueError> {
        let mut queues = self.lock();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;

        let now = Instant::now();
        state.reclaim_expired(now);

        let received = state.ready.pop_front().map(|message| {
            let receipt_handle = Uuid::new_v4().to_string();
            let received = ReceivedMessage {
                message_id: message.id.clone(),
                receipt_handle: receipt_handle.clone(),
                body: message.body.clone(),
            };
            state.in_flight.insert(
                receipt_handle,
                InFlight {
                    message,
                    visible_at: now + visibility_timeout,
                },
            );
            received
        });

        Ok((received, state.next_redelivery()))
    }
}

#[async_trait]
impl ActionQueue for MemoryActionQueue {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueRef, QueueError> {
        let queue_ref = Self::queue_ref_for(name);
        self.lock()
            .entry(queue_ref.clone())
            .or_insert_with(|| QueueState::new(*attributes));
        Ok(queue_ref)
    }

    async fn send_message(&self, queue: &QueueRef, body: &str) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        {
            let mut queues = self.lock();
            let state = queues
                .get_mut(queue)
                .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;
            state.ready.push_back(StoredMessage {
                id: id.clone(),
                body: body.to_string(),
            });
        }
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn receive_message(
        &self,
        queue: &QueueRef,
        visibility_timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let receive_wait = self
            .lock()
            .get(queue)
            .map(|q| q.attributes.receive_wait)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;
        let deadline = Instant::now() + receive_wait;

        loop {
            // Register interest before looking, so a send in between is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (received, next_redelivery) = self.try_receive(queue, visibility_timeout)?;
            if received.is_some() {
                return Ok(received);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }

            let wake_at = next_redelivery.map_or(deadline, |at| at.min(deadline));
            let _ = timeout_at(wake_at, notified).await;
        }
    }

    async fn delete_message(
        &self,
        queue: &QueueRef,
        receipt_handle: &str,
    ) -> Result<(), QueueError> {
        let mut queues = self.lock();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;

        state
            .in_flight
            .remove(receipt_handle)
            .map(|_| ())
            .ok_or_else(|| QueueError::InvalidReceipt {
                queue: queue.to_string(),
                receipt_handle: receipt_handle.to_string(),
            })
    }

    async fn delete_queue(&self, queue: &QueueRef) -> Result<(), QueueError> {
        let removed = self.lock().remove(queue);
        // Wake receivers so they observe the deletion instead of sleeping out their window
        self.notify.notify_waiters();
        removed
            .map(|_| ())
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))
    }
}

/// A started execution
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub name: String,
    pub call_flow: CallFlowRef,
    pub input: Value,
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
struct EngineState {
    executions: HashMap<String, ExecutionRecord>,
    /// token -> execution name
    waiting: HashMap<WaitToken, String>,
    signals: Vec<SignalRecord>,
}

/// In-memory [`WorkflowEngine`].
///
/// Steps "wait" by calling [`MemoryWorkflowEngine::issue_wait_token`]; each
/// token can be signalled exactly once.
#[derive(Default)]
pub struct MemoryWorkflowEngine {
    state: Mutex<EngineState>,
}

impl MemoryWorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a step of `execution` and return the token that resumes it
    pub fn issue_wait_token(&self, execution: &str) -> Result<WaitToken, WorkflowError> {
        let mut state = self.lock();
        if !state.executions.contains_key(execution) {
            return Err(WorkflowError::ExecutionNotFound(execution.to_string()));
        }
        let token = WaitToken::new(format!("{}.{}", execution, Uuid::new_v4()));
        state.waiting.insert(token.clone(), execution.to_string());
        Ok(token)
    }

    pub fn execution(&self, name: &str) -> Option<ExecutionRecord> {
        self.lock().executions.get(name).cloned()
    }

    pub fn execution_count(&self) -> usize {
        self.lock().executions.len()
    }

    /// Every signal received, oldest first
    pub fn signals(&self) -> Vec<SignalRecord> {
        self.lock().signals.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resume(&self, token: &WaitToken, outcome: TaskOutcome) -> Result<(), WorkflowError> {
        let mut state = self.lock();
        if state.waiting.remove(token).is_none() {
            return Err(WorkflowError::UnknownToken(token.to_string()));
        }
        state.signals.push(SignalRecord {
            token: token.clone(),
            outcome,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl WorkflowEngine for MemoryWorkflowEngine {
    fn name(&self) -> &str {
        "memory"
    }

    async fn start_execution(
        &self,
        name: &str,
        call_flow: &CallFlowRef,
        input: &Value,
    ) -> Result<String, WorkflowError> {
        let mut state = self.lock();
        if state.executions.contains_key(name) {
            return Err(WorkflowError::ExecutionAlreadyExists(name.to_string()));
        }
        state.executions.insert(
            name.to_string(),
            ExecutionRecord {
                name: name.to_string(),
                call_flow: call_flow.clone(),
                input: input.clone(),
                started_at: Utc::now(),
            },
        );
        Ok(format!("{}:{}", call_flow, name))
    }

    async fn send_task_success(
        &self,
        token: &WaitToken,
        output: &Value,
    ) -> Result<(), WorkflowError> {
        self.resume(
            token,
            TaskOutcome::Success {
                output: output.clone(),
            },
        )
    }

    async fn send_task_failure(
        &self,
        token: &WaitToken,
        error: &str,
        cause: &str,
    ) -> Result<(), WorkflowError> {
        self.resume(
            token,
            TaskOutcome::Failure {
                error: error.to_string(),
                cause: cause.to_string(),
            },
        )
    }
}
