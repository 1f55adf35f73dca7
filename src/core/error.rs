//! Errors raised while routing a telephony event.

use thiserror::Error;

use crate::adapters::{QueueError, WorkflowError};

/// Failure of a single invocation.
///
/// Every variant is fatal for the event being processed; none of them is
/// turned into an empty action batch.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Invalid participant count: {0} (expected 1 or 2)")]
    InvalidParticipantCount(usize),

    #[error("No call flow found for number: {number}")]
    CallFlowNotFound { number: String },

    #[error("Wait token is not waiting on any workflow step: {0}")]
    UnknownToken(String),

    #[error("No action available on queue {queue}")]
    NoActionAvailable { queue: String },

    #[error("Workflow execution already exists: {0}")]
    ExecutionAlreadyExists(String),

    #[error("Action payload is not valid JSON: {0}")]
    InvalidActionPayload(String),

    #[error("Queue error: {0}")]
    Queue(#[source] QueueError),

    #[error("Workflow error: {0}")]
    Workflow(#[source] WorkflowError),
}

impl BridgeError {
    /// Stable name of the error kind, for logs and failure responses
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::MalformedEvent(_) => "MalformedEventError",
            BridgeError::InvalidParticipantCount(_) => "InvalidParticipantCountError",
            BridgeError::CallFlowNotFound { .. } => "CallFlowNotFoundError",
            BridgeError::UnknownToken(_) => "UnknownTokenError",
            BridgeError::NoActionAvailable { .. } => "NoActionAvailableError",
            BridgeError::ExecutionAlreadyExists(_) => "ExecutionAlreadyExistsError",
            BridgeError::InvalidActionPayload(_) => "InvalidActionPayloadError",
            BridgeError::Queue(_) => "QueueError",
            BridgeError::Workflow(_) => "WorkflowError",
        }
    }
}

impl From<QueueError> for BridgeError {
    fn from(err: QueueError) -> Self {
        BridgeError::Queue(err)
    }
}

impl From<WorkflowError> for BridgeError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::UnknownToken(token) => BridgeError::UnknownToken(token),
            WorkflowError::ExecutionAlreadyExists(name) => BridgeError::ExecutionAlreadyExists(name),
            other => BridgeError::Workflow(other),
        }
    }
}
