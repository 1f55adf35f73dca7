//! Collaborator interfaces for the message queue and the workflow engine.
//!
//! The router only depends on these traits. Two implementations of each
//! ship with the crate: an in-process one (`memory`) and a local
//! journal-backed one (`file_queue`, `file_workflow`) used by the CLI.

pub mod file_queue;
pub mod file_workflow;
mod journal;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{CallFlowRef, QueueRef, WaitToken};

pub use file_queue::{FileActionQueue, QueueSummary};
pub use file_workflow::{ExecutionEvent, ExecutionEventKind, FileWorkflowEngine};
pub use memory::{MemoryActionQueue, MemoryWorkflowEngine};

/// Default long-poll window for a receive
pub const DEFAULT_RECEIVE_WAIT: Duration = Duration::from_secs(18);

/// Default time a received, unacknowledged message stays hidden
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors raised by an [`ActionQueue`]
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue does not exist: {0}")]
    QueueNotFound(String),

    #[error("Receipt handle is not valid for queue {queue}: {receipt_handle}")]
    InvalidReceipt {
        queue: String,
        receipt_handle: String,
    },

    #[error("Not a valid queue name: {0}")]
    InvalidQueueName(String),

    #[error("Body digest mismatch for message {0}")]
    DigestMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a [`WorkflowEngine`]
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Execution already exists: {0}")]
    ExecutionAlreadyExists(String),

    #[error("Execution does not exist: {0}")]
    ExecutionNotFound(String),

    #[error("Not a valid execution name: {0}")]
    InvalidExecutionName(String),

    #[error("Task token is not waiting: {0}")]
    UnknownToken(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Attributes a queue is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAttributes {
    /// How long a receive blocks waiting for a message
    pub receive_wait: Duration,

    /// How long a received message stays invisible before redelivery
    pub visibility_timeout: Duration,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        Self {
            receive_wait: DEFAULT_RECEIVE_WAIT,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }
}

/// A message handed out by [`ActionQueue::receive_message`]
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,

    /// Handle needed to acknowledge (delete) this delivery
    pub receipt_handle: String,

    pub body: String,
}

/// Outcome sent to a waiting workflow step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success { output: Value },
    Failure { error: String, cause: String },
}

/// A signal as recorded by an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub token: WaitToken,
    pub outcome: TaskOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Per-call message queue
#[async_trait]
pub trait ActionQueue: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Create a queue, or return the handle of the existing queue with this name
    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueRef, QueueError>;

    /// Append a message, returning its id
    async fn send_message(&self, queue: &QueueRef, body: &str) -> Result<String, QueueError>;

    /// Wait up to the queue's receive window for one visible message
    async fn receive_message(
        &self,
        queue: &QueueRef,
        visibility_timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Acknowledge a delivery
    async fn delete_message(&self, queue: &QueueRef, receipt_handle: &str)
        -> Result<(), QueueError>;

    /// Remove the queue and every message in it
    async fn delete_queue(&self, queue: &QueueRef) -> Result<(), QueueError>;
}

/// Step-based workflow engine
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Start a run of `call_flow` named `name`; a name can only be started once
    async fn start_execution(
        &self,
        name: &str,
        call_flow: &CallFlowRef,
        input: &Value,
    ) -> Result<String, WorkflowError>;

    /// Resume the step waiting on `token` with a success outcome
    async fn send_task_success(&self, token: &WaitToken, output: &Value)
        -> Result<(), WorkflowError>;

    /// Resume the step waiting on `token` with a failure outcome
    async fn send_task_failure(
        &self,
        token: &WaitToken,
        error: &str,
        cause: &str,
    ) -> Result<(), WorkflowError>;
}
