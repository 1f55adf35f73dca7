//! Identifier newtypes shared by the router and the collaborators.
//!
//! All of them are opaque strings on the wire; the wrappers keep a wait
//! token from being passed where a queue handle is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix applied to a transaction id to form the session id
pub const SESSION_PREFIX: &str = "call_flow_";

/// Identity of one call attempt.
///
/// Derived from the call's transaction id, so every event of the same call
/// maps to the same session. Used as both the queue name and the workflow
/// execution name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Derive the session id for a transaction
    pub fn from_transaction(transaction_id: &str) -> Self {
        Self(format!("{}{}", SESSION_PREFIX, transaction_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! string_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_handle!(
    /// Handle correlating a paused workflow step with the event that resumes it
    WaitToken
);

string_handle!(
    /// Handle to a per-call action queue (a URL for the bundled queues)
    QueueRef
);

string_handle!(
    /// Reference to a workflow template (call flow)
    CallFlowRef
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_is_deterministic() {
        let first = SessionId::from_transaction("T1");
        let second = SessionId::from_transaction("T1");

        assert_eq!(first, second);
        assert_eq!(first.as_str(), "call_flow_T1");
    }

    #[test]
    fn test_handles_serialize_as_plain_strings() {
        let token = WaitToken::new("abc");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"abc\"");
    }
}
