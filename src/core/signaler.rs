//! Workflow execution start and step signalling.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::adapters::WorkflowEngine;
use crate::domain::{CallFlowRef, QueueRef, SessionId, WaitToken};

use super::error::BridgeError;

/// Cause sent with a failure when the event carries no error message
pub const NO_CAUSE_REPORTED: &str = "No cause reported";

/// Cause sent when LEG-A hangs up
pub const CALL_ENDED: &str = "Call Ended";

pub struct WorkflowSignaler {
    engine: Arc<dyn WorkflowEngine>,
}

impl WorkflowSignaler {
    pub fn new(engine: Arc<dyn WorkflowEngine>) -> Self {
        Self { engine }
    }

    /// Input handed to a new execution: the queue it must post actions to
    /// and the event that opened the call
    pub fn execution_input(queue: &QueueRef, event: &Value) -> Value {
        json!({
            "QueueUrl": queue,
            "Event": event,
        })
    }

    /// Start the call flow as an execution named after the session
    #[instrument(skip(self, input), fields(engine = self.engine.name()))]
    pub async fn start_execution(
        &self,
        session_id: &SessionId,
        call_flow: &CallFlowRef,
        input: &Value,
    ) -> Result<String, BridgeError> {
        let execution = self
            .engine
            .start_execution(session_id.as_str(), call_flow, input)
            .await?;
        info!(%execution, "Workflow execution started");
        Ok(execution)
    }

    #[instrument(skip(self, payload), fields(engine = self.engine.name()))]
    pub async fn signal_success(
        &self,
        wait_token: &WaitToken,
        payload: &Value,
    ) -> Result<(), BridgeError> {
        self.engine.send_task_success(wait_token, payload).await?;
        info!("Step resumed with success");
        Ok(())
    }

    #[instrument(skip(self), fields(engine = self.engine.name()))]
    pub async fn signal_failure(
        &self,
        wait_token: &WaitToken,
        error_code: &str,
        cause: &str,
    ) -> Result<(), BridgeError> {
        self.engine
            .send_task_failure(wait_token, error_code, cause)
            .await?;
        info!("Step resumed with failure");
        Ok(())
    }
}
