//! Journal-backed workflow engine for local runs.
//!
//! Records executions, the wait tokens their steps park on, and the
//! signals that resume them. The workflow logic itself runs elsewhere: it
//! calls [`FileWorkflowEngine::issue_wait_token`] when a step starts
//! waiting and reads [`FileWorkflowEngine::history`] to learn the outcome.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::journal::{is_safe_name, Journal};
use super::{TaskOutcome, WorkflowEngine, WorkflowError};
use crate::domain::{CallFlowRef, WaitToken};

/// One line of an execution journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub kind: ExecutionEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEventKind {
    Started {
        call_flow: CallFlowRef,
        input: Value,
    },
    TokenIssued {
        token: WaitToken,
    },
    TaskResumed {
        token: WaitToken,
        #[serde(flatten)]
        outcome: TaskOutcome,
    },
}

impl ExecutionEvent {
    fn now(kind: ExecutionEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Tokens issued and not yet resumed
fn waiting_tokens(events: &[ExecutionEvent]) -> Vec<&WaitToken> {
    let mut waiting: Vec<&WaitToken> = Vec::new();
    for event in events {
        match &event.kind {
            ExecutionEventKind::TokenIssued { token } => waiting.push(token),
            ExecutionEventKind::TaskResumed { token, .. } => waiting.retain(|t| *t != token),
            ExecutionEventKind::Started { .. } => {}
        }
    }
    waiting
}

/// [`WorkflowEngine`] recording to `<root>/<execution>.jsonl`
pub struct FileWorkflowEngine {
    root: PathBuf,
}

impl FileWorkflowEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Park a step of `execution`; the returned token resumes it
    pub async fn issue_wait_token(&self, execution: &str) -> Result<WaitToken, WorkflowError> {
        let journal = self.journal(execution)?;
        let token = WaitToken::new(format!("{}.{}", execution, Uuid::new_v4()));
        let record = ExecutionEvent::now(ExecutionEventKind::TokenIssued {
            token: token.clone(),
        });

        run_blocking(move || {
            journal.update::<ExecutionEvent, _, WorkflowError, _>(|_| Ok((vec![record], ())))
        })
        .await?
        .map_err(|e| not_found_as(execution, e))?;

        Ok(token)
    }

    /// The full journal of an execution
    pub async fn history(&self, execution: &str) -> Result<Vec<ExecutionEvent>, WorkflowError> {
        let journal = self.journal(execution)?;
        if !journal.path().exists() {
            return Err(WorkflowError::ExecutionNotFound(execution.to_string()));
        }
        Ok(run_blocking(move || journal.replay()).await??)
    }

    fn journal(&self, execution: &str) -> Result<Journal, WorkflowError> {
        if !is_safe_name(execution) {
            return Err(WorkflowError::InvalidExecutionName(execution.to_string()));
        }
        Ok(Journal::new(self.root.join(format!("{}.jsonl", execution))))
    }

    async fn resume(&self, token: &WaitToken, outcome: TaskOutcome) -> Result<(), WorkflowError> {
        // Tokens are minted as "<execution>.<uuid>"
        let execution = token
            .as_str()
            .rsplit_once('.')
            .map(|(execution, _)| execution.to_string())
            .ok_or_else(|| WorkflowError::UnknownToken(token.to_string()))?;

        // A token naming no valid execution cannot be waiting
        let journal = self
            .journal(&execution)
            .map_err(|_| WorkflowError::UnknownToken(token.to_string()))?;
        let token_name = token.to_string();
        let token = token.clone();
        let record = ExecutionEvent::now(ExecutionEventKind::TaskResumed {
            token: token.clone(),
            outcome,
        });

        run_blocking(move || {
            journal.update::<ExecutionEvent, _, WorkflowError, _>(|events| {
                if !waiting_tokens(&events).contains(&&token) {
                    return Err(WorkflowError::UnknownToken(token.to_string()));
                }
                Ok((vec![record], ()))
            })
        })
        .await?
        .map_err(|e| match e {
            // The token names an execution this engine never started
            WorkflowError::Io(ref io) if io.kind() == ErrorKind::NotFound => {
                WorkflowError::UnknownToken(token_name)
            }
            other => other,
        })
    }
}

#[async_trait]
impl WorkflowEngine for FileWorkflowEngine {
    fn name(&self) -> &str {
        "file"
    }

    async fn start_execution(
        &self,
        name: &str,
        call_flow: &CallFlowRef,
        input: &Value,
    ) -> Result<String, WorkflowError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let journal = self.journal(name)?;
        let started = ExecutionEvent::now(ExecutionEventKind::Started {
            call_flow: call_flow.clone(),
            input: input.clone(),
        });

        match run_blocking(move || journal.create_new(&[started])).await? {
            Ok(()) => {
                debug!(execution = %name, %call_flow, "Execution journal created");
                Ok(format!("{}:{}", call_flow, name))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(WorkflowError::ExecutionAlreadyExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
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
        .await
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
        .await
    }
}

fn not_found_as(execution: &str, err: WorkflowError) -> WorkflowError {
    match err {
        WorkflowError::Io(ref io) if io.kind() == ErrorKind::NotFound => {
            WorkflowError::ExecutionNotFound(execution.to_string())
        }
        other => other,
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, WorkflowError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkflowError::Io(std::io::Error::new(ErrorKind::Other, e)))
}
