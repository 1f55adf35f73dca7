//! Action batches returned to the call-control plane.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response schema version understood by the call-control plane
pub const SCHEMA_VERSION: &str = "1.0";

/// The next set of actions for the call.
///
/// Batches produced by the workflow are passed through unchanged; the
/// router only ever constructs the empty batch itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionBatch(Value);

impl ActionBatch {
    /// `{"SchemaVersion": "1.0", "Actions": []}`
    pub fn empty() -> Self {
        Self(json!({
            "SchemaVersion": SCHEMA_VERSION,
            "Actions": [],
        }))
    }

    /// Wrap a payload received from the workflow
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// The actions array, if the payload has one
    pub fn actions(&self) -> Option<&Vec<Value>> {
        self.0.get("Actions").and_then(Value::as_array)
    }

    /// True when the batch carries no actions
    pub fn is_empty(&self) -> bool {
        self.actions().map(|a| a.is_empty()).unwrap_or(true)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch_shape() {
        let batch = ActionBatch::empty();
        assert_eq!(
            serde_json::to_string(&batch).unwrap(),
            r#"{"Actions":[],"SchemaVersion":"1.0"}"#
        );
        assert!(batch.is_empty());
    }

    #[test]
    fn test_workflow_payload_is_untouched() {
        let payload = json!({
            "SchemaVersion": "1.0",
            "Actions": [{ "Type": "Speak", "Parameters": { "Text": "Hello" } }],
            "TransactionAttributes": { "WaitToken": "tok" }
        });
        let batch = ActionBatch::from_value(payload.clone());

        assert!(!batch.is_empty());
        assert_eq!(batch.actions().unwrap().len(), 1);
        assert_eq!(batch.into_value(), payload);
    }
}
