//! Per-invocation event context.
//!
//! Built fresh from every raw event and never persisted. Validation happens
//! here, before any collaborator is touched.

use serde_json::Value;

use crate::domain::{
    CallFlowRef, EventType, InvocationEvent, LegTag, Participant, QueueRef, SessionId, WaitToken,
};

use super::error::BridgeError;
use super::participant::resolve_main_participant;

/// Validated, structured view of one telephony event
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event_type: EventType,

    pub participants: Vec<Participant>,

    /// Index into `participants`
    main: usize,

    /// Leg that triggered a HANGUP
    pub hungup_leg: Option<LegTag>,

    error_message: Option<String>,

    pub wait_token: Option<WaitToken>,

    pub queue_ref: Option<QueueRef>,

    pub session_id: SessionId,

    /// Assigned once the call flow has been resolved (call start only)
    pub call_flow_ref: Option<CallFlowRef>,

    /// The event exactly as received, forwarded to the workflow as payload
    pub raw: Value,
}

impl EventContext {
    /// Parse and validate a raw event
    pub fn from_event(raw: Value) -> Result<Self, BridgeError> {
        let event: InvocationEvent = serde_json::from_value(raw.clone())
            .map_err(|e| BridgeError::MalformedEvent(e.to_string()))?;

        let participants = event.call_details.participants.clone();
        let main = resolve_main_participant(&participants)?;

        let attributes = event
            .call_details
            .transaction_attributes
            .clone()
            .unwrap_or_default();

        let ctx = Self {
            event_type: event.invocation_event_type,
            hungup_leg: event.action_participant_tag().cloned(),
            error_message: event.error_message().map(str::to_string),
            wait_token: attributes.wait_token.map(WaitToken::new),
            queue_ref: attributes.queue_url.map(QueueRef::new),
            session_id: SessionId::from_transaction(&event.call_details.transaction_id),
            call_flow_ref: None,
            participants,
            main,
            raw,
        };

        ctx.check_correlation()?;
        Ok(ctx)
    }

    /// The participant representing the call for routing decisions
    pub fn main_participant(&self) -> &Participant {
        &self.participants[self.main]
    }

    /// Whether the handling of this event signals a waiting workflow step
    pub fn requires_correlation(&self) -> bool {
        match self.event_type {
            EventType::NewInboundCall
            | EventType::NewOutboundCall
            | EventType::ActionInterrupted
            | EventType::Ringing => false,
            EventType::ActionSuccessful => !self.main_participant().is_disconnected(),
            _ => true,
        }
    }

    /// Only the terminal hangup leaves exactly one, disconnected, leg
    pub fn is_call_ended(&self) -> bool {
        self.participants.len() == 1 && self.main_participant().is_disconnected()
    }

    /// Copy of the context with the resolved call flow attached
    pub fn with_call_flow(mut self, call_flow: CallFlowRef) -> Self {
        self.call_flow_ref = Some(call_flow);
        self
    }

    /// The wait token, or a malformed-event error naming what was expected
    pub fn require_wait_token(&self) -> Result<&WaitToken, BridgeError> {
        self.wait_token.as_ref().ok_or_else(|| {
            BridgeError::MalformedEvent(format!("{} event without a WaitToken", self.event_type))
        })
    }

    pub fn require_queue_ref(&self) -> Result<&QueueRef, BridgeError> {
        self.queue_ref.as_ref().ok_or_else(|| {
            BridgeError::MalformedEvent(format!("{} event without a QueueUrl", self.event_type))
        })
    }

    /// Error message reported with a failed action
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    fn check_correlation(&self) -> Result<(), BridgeError> {
        if self.requires_correlation() {
            self.require_wait_token()?;
            self.require_queue_ref()?;
        }
        Ok(())
    }
}
