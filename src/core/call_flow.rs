//! Number → call flow table.
//!
//! Inbound calls are routed by the number that was dialed, outbound calls
//! by the number they are placed from.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::{CallFlowRef, Direction, Participant};

use super::error::BridgeError;

/// One configured mapping.
///
/// Accepts both `{number, call_flow}` (YAML config) and `{DID, ARN}`
/// (the `CALL_FLOWS_DID_MAP` environment variable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFlowEntry {
    #[serde(alias = "DID")]
    pub number: String,

    #[serde(alias = "ARN")]
    pub call_flow: CallFlowRef,
}

/// Lookup table, loaded once per process
#[derive(Debug, Clone, Default)]
pub struct CallFlowTable {
    entries: HashMap<String, CallFlowRef>,
}

impl CallFlowTable {
    /// Build the table, rejecting a number mapped twice
    pub fn from_entries(entries: impl IntoIterator<Item = CallFlowEntry>) -> Result<Self> {
        let mut table = HashMap::new();
        for entry in entries {
            if entry.number.trim().is_empty() {
                anyhow::bail!("Call flow '{}' has an empty number", entry.call_flow);
            }
            if let Some(existing) = table.insert(entry.number.clone(), entry.call_flow.clone()) {
                anyhow::bail!(
                    "Number {} is mapped to both '{}' and '{}'",
                    entry.number,
                    existing,
                    entry.call_flow
                );
            }
        }
        Ok(Self { entries: table })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number that selects the call flow for this participant
    pub fn routing_number(participant: &Participant) -> &str {
        match participant.direction {
            Direction::Inbound => &participant.to,
            Direction::Outbound => &participant.from,
        }
    }

    /// Resolve the call flow for the main participant of a new call
    pub fn resolve(&self, participant: &Participant) -> Result<CallFlowRef, BridgeError> {
        let number = Self::routing_number(participant);
        self.entries
            .get(number)
            .cloned()
            .ok_or_else(|| BridgeError::CallFlowNotFound {
                number: number.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LegTag, ParticipantStatus};

    fn table() -> CallFlowTable {
        CallFlowTable::from_entries(vec![
            CallFlowEntry {
                number: "+15551234567".to_string(),
                call_flow: CallFlowRef::from("flow-A"),
            },
            CallFlowEntry {
                number: "+15557654321".to_string(),
                call_flow: CallFlowRef::from("flow-B"),
            },
        ])
        .unwrap()
    }

    fn participant(direction: Direction, to: &str, from: &str) -> Participant {
        Participant {
            tag: LegTag::LegA,
            direction,
            to: to.to_string(),
            from: from.to_string(),
            status: ParticipantStatus::Connected,
        }
    }

    #[test]
    fn test_inbound_keys_on_to() {
        let p = participant(Direction::Inbound, "+15551234567", "+15557654321");
        assert_eq!(table().resolve(&p).unwrap(), CallFlowRef::from("flow-A"));
    }

    #[test]
    fn test_outbound_keys_on_from() {
        let p = participant(Direction::Outbound, "+15551234567", "+15557654321");
        assert_eq!(table().resolve(&p).unwrap(), CallFlowRef::from("flow-B"));
    }

    #[test]
    fn test_miss_is_an_error() {
        let p = participant(Direction::Inbound, "+10000000000", "+15551234567");
        match table().resolve(&p) {
            Err(BridgeError::CallFlowNotFound { number }) => assert_eq!(number, "+10000000000"),
            other => panic!("Expected CallFlowNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_numbers_rejected() {
        let entry = CallFlowEntry {
            number: "+15551234567".to_string(),
            call_flow: CallFlowRef::from("flow-A"),
        };
        assert!(CallFlowTable::from_entries(vec![entry.clone(), entry]).is_err());
    }

    #[test]
    fn test_did_map_format() {
        let entries: Vec<CallFlowEntry> = serde_json::from_str(
            r#"[{"DID":"+15551234567","ARN":"arn:aws:states:us-east-1:1:stateMachine:flow"}]"#,
        )
        .unwrap();
        let table = CallFlowTable::from_entries(entries).unwrap();
        assert_eq!(table.len(), 1);
    }
}
