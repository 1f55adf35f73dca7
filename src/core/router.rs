//! Event routing.
//!
//! Maps one telephony event to the session, signal and action-queue
//! operations it implies, and to the response for the call-control plane.
//!
//! | Event | Handling |
//! |-------|----------|
//! | `NEW_INBOUND_CALL`, `NEW_OUTBOUND_CALL` | resolve call flow, open session, start execution, await action |
//! | `ACTION_SUCCESSFUL` on a disconnected call | empty actions, no signal |
//! | `ACTION_INTERRUPTED`, `RINGING` | empty actions |
//! | `ACTION_SUCCESSFUL`, `CALL_ANSWERED`, `CALL_UPDATE_REQUESTED`, `DIGITS_RECEIVED` | signal success with the event, await action |
//! | `INVALID_LAMBDA_RESPONSE`, `ACTION_FAILED` | signal failure with the error message, await action |
//! | `HANGUP` from LEG-A | signal failure (`Call Ended`), then teardown rule |
//! | `HANGUP` from any other leg | signal success with the event, then teardown rule |
//!
//! Teardown rule: when a single, disconnected participant remains the
//! session is destroyed and empty actions are returned; otherwise the
//! router awaits the next action.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument};

use crate::adapters::{ActionQueue, QueueAttributes, WorkflowEngine};
use crate::domain::{ActionBatch, EventType, LegTag};

use super::call_flow::CallFlowTable;
use super::channel::ActionChannel;
use super::context::EventContext;
use super::error::BridgeError;
use super::session::SessionManager;
use super::signaler::{WorkflowSignaler, CALL_ENDED, NO_CAUSE_REPORTED};

/// Signal owed to the waiting workflow step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSignal {
    /// Resume with the raw event as output
    Success,

    /// Resume with a failure
    Failure { code: String, cause: String },
}

/// Routing decision for one event, before any collaborator is called
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// First event of a call
    StartSession,

    /// Nothing to do; answer with an empty action batch
    Ignore,

    /// Resume the waiting step, then wait for the next action
    Signal(StepSignal),

    /// Resume the waiting step, then either tear down or wait
    Hangup { signal: StepSignal, teardown: bool },
}

impl Route {
    /// Classify an event
    pub fn classify(ctx: &EventContext) -> Route {
        match ctx.event_type {
            EventType::NewInboundCall | EventType::NewOutboundCall => Route::StartSession,

            EventType::ActionSuccessful if ctx.main_participant().is_disconnected() => {
                Route::Ignore
            }

            EventType::ActionInterrupted | EventType::Ringing => Route::Ignore,

            EventType::ActionSuccessful
            | EventType::CallAnswered
            | EventType::CallUpdateRequested
            | EventType::DigitsReceived => Route::Signal(StepSignal::Success),

            EventType::InvalidLambdaResponse | EventType::ActionFailed => {
                Route::Signal(StepSignal::Failure {
                    code: ctx.event_type.as_str().to_string(),
                    cause: ctx.error_message().unwrap_or(NO_CAUSE_REPORTED).to_string(),
                })
            }

            EventType::Hangup => {
                let signal = if ctx.hungup_leg == Some(LegTag::LegA) {
                    StepSignal::Failure {
                        code: EventType::Hangup.as_str().to_string(),
                        cause: CALL_ENDED.to_string(),
                    }
                } else {
                    StepSignal::Success
                };
                Route::Hangup {
                    signal,
                    teardown: ctx.is_call_ended(),
                }
            }
        }
    }
}

/// Routes telephony events for every call handled by this process
///
/// ```rust
/// use std::sync::Arc;
/// use callbridge::adapters::{MemoryActionQueue, MemoryWorkflowEngine, QueueAttributes};
/// use callbridge::core::{CallFlowTable, EventRouter};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let router = EventRouter::new(
///     Arc::new(MemoryActionQueue::new()),
///     Arc::new(MemoryWorkflowEngine::new()),
///     CallFlowTable::default(),
///     QueueAttributes::default(),
/// );
///
/// let batch = router
///     .handle_event(json!({
///         "InvocationEventType": "RINGING",
///         "CallDetails": {
///             "TransactionId": "T1",
///             "Participants": [{
///                 "ParticipantTag": "LEG-A",
///                 "Direction": "Outbound",
///                 "To": "+15559999999",
///                 "From": "+15551234567",
///             }],
///         },
///     }))
///     .await
///     .unwrap();
/// assert!(batch.is_empty());
/// # })
/// ```
pub struct EventRouter {
    call_flows: CallFlowTable,
    sessions: SessionManager,
    signaler: WorkflowSignaler,
    channel: ActionChannel,
}

impl EventRouter {
    /// Build a router over the given collaborators
    pub fn new(
        queue: Arc<dyn ActionQueue>,
        engine: Arc<dyn WorkflowEngine>,
        call_flows: CallFlowTable,
        attributes: QueueAttributes,
    ) -> Self {
        Self {
            call_flows,
            sessions: SessionManager::new(queue.clone(), attributes),
            signaler: WorkflowSignaler::new(engine),
            channel: ActionChannel::new(queue, attributes),
        }
    }

    /// Process one raw event end to end.
    ///
    /// Errors are logged here and returned; they are never converted into
    /// an empty action batch, which the call-control plane would read as
    /// "nothing to do".
    pub async fn handle_event(&self, raw: Value) -> Result<ActionBatch, BridgeError> {
        match self.route(raw).await {
            Ok(batch) => Ok(batch),
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Event handling failed");
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(event_type = tracing::field::Empty, session = tracing::field::Empty))]
    async fn route(&self, raw: Value) -> Result<ActionBatch, BridgeError> {
        let ctx = EventContext::from_event(raw)?;
        let span = tracing::Span::current();
        span.record("event_type", ctx.event_type.as_str());
        span.record("session", ctx.session_id.as_str());

        let route = Route::classify(&ctx);
        info!(?route, participants = ctx.participants.len(), "Event classified");

        match route {
            Route::StartSession => self.start_session(ctx).await,

            Route::Ignore => Ok(ActionBatch::empty()),

            Route::Signal(signal) => {
                self.send_signal(&ctx, &signal).await?;
                self.channel.await_next_action(ctx.require_queue_ref()?).await
            }

            Route::Hangup { signal, teardown } => {
                self.send_signal(&ctx, &signal).await?;
                let queue = ctx.require_queue_ref()?;
                if teardown {
                    self.sessions.destroy_session(queue).await?;
                    Ok(ActionBatch::empty())
                } else {
                    self.channel.await_next_action(queue).await
                }
            }
        }
    }

    async fn start_session(&self, ctx: EventContext) -> Result<ActionBatch, BridgeError> {
        let call_flow = self.call_flows.resolve(ctx.main_participant())?;
        let ctx = ctx.with_call_flow(call_flow.clone());

        let session = self.sessions.create_session(&ctx.session_id).await?;
        let input = WorkflowSignaler::execution_input(&session.queue, &ctx.raw);
        self.signaler
            .start_execution(&session.id, &call_flow, &input)
            .await?;

        self.channel.await_next_action(&session.queue).await
    }

    async fn send_signal(&self, ctx: &EventContext, signal: &StepSignal) -> Result<(), BridgeError> {
        let token = ctx.require_wait_token()?;
        match signal {
            StepSignal::Success => self.signaler.signal_success(token, &ctx.raw).await,
            StepSignal::Failure { code, cause } => {
                self.signaler.signal_failure(token, code, cause).await
            }
        }
    }
}
