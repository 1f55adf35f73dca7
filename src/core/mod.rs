//! Call-event routing core.
//!
//! This module contains:
//! - EventContext: validated per-invocation view of an event
//! - Participant resolution and call-flow lookup
//! - SessionManager, WorkflowSignaler, ActionChannel: collaborator-facing steps
//! - EventRouter: the dispatch table tying them together

pub mod call_flow;
pub mod channel;
pub mod context;
pub mod error;
pub mod participant;
pub mod router;
pub mod session;
pub mod signaler;

// Re-export commonly used types
pub use call_flow::{CallFlowEntry, CallFlowTable};
pub use channel::ActionChannel;
pub use context::EventContext;
pub use error::BridgeError;
pub use participant::resolve_main_participant;
pub use router::{EventRouter, Route, StepSignal};
pub use session::{CallSession, SessionManager};
pub use signaler::{WorkflowSignaler, CALL_ENDED, NO_CAUSE_REPORTED};
