//! callbridge - Telephony call events to workflow steps
//!
//! Bridges a call-control plane that invokes a handler once per call event
//! and a workflow engine that runs each call's flow as a sequence of
//! waiting steps.
//!
//! # Architecture
//!
//! Each call gets a session: a message queue named `call_flow_<transaction>`
//! on which the workflow posts the next batch of actions. An event either
//! starts the call's workflow execution, resumes the step parked on the
//! event's wait token, or is ignored; the handler then blocks on the queue
//! and returns whatever actions arrive.
//!
//! # Modules
//!
//! - `domain`: Event and action data (InvocationEvent, Participant, ActionBatch)
//! - `core`: Routing logic (EventContext, EventRouter, session and signal handling)
//! - `adapters`: Queue and workflow engine interfaces with memory and file backends
//! - `config`: Call-flow table, queue timing and paths
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Handle one event
//! callbridge handle --input event.json
//!
//! # Post the next actions for a call
//! echo '{"SchemaVersion":"1.0","Actions":[]}' | callbridge send-action call_flow_T1
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::adapters::{ActionQueue, QueueAttributes, WorkflowEngine};
pub use crate::core::{BridgeError, CallFlowTable, EventContext, EventRouter};
pub use crate::domain::{ActionBatch, EventType, InvocationEvent, Participant};
