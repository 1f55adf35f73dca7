//! Domain types for the call bridge.
//!
//! This module contains the data exchanged with the call-control plane:
//! - Events: telephony lifecycle events and their participants
//! - Ids: session, queue, wait-token and call-flow handles
//! - Actions: the batches returned for the call

pub mod action;
pub mod event;
pub mod ids;

// Re-export commonly used types
pub use action::{ActionBatch, SCHEMA_VERSION};
pub use event::{
    ActionData, CallDetails, Direction, EventType, InvocationEvent, LegTag, Participant,
    ParticipantStatus, TransactionAttributes,
};
pub use ids::{CallFlowRef, QueueRef, SessionId, WaitToken};
