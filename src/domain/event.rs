//! Telephony events as delivered by the call-control plane.
//!
//! Only the fields the router reads are modelled; everything else in the
//! payload is ignored here and kept verbatim in the raw JSON that is
//! forwarded to the workflow.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle event types emitted for an in-progress call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    NewInboundCall,
    NewOutboundCall,
    ActionSuccessful,
    ActionFailed,
    ActionInterrupted,
    CallAnswered,
    CallUpdateRequested,
    DigitsReceived,
    InvalidLambdaResponse,
    Ringing,
    Hangup,
}

impl EventType {
    /// All event types, in documentation order
    pub const ALL: [EventType; 11] = [
        EventType::NewInboundCall,
        EventType::NewOutboundCall,
        EventType::ActionSuccessful,
        EventType::ActionFailed,
        EventType::ActionInterrupted,
        EventType::CallAnswered,
        EventType::CallUpdateRequested,
        EventType::DigitsReceived,
        EventType::InvalidLambdaResponse,
        EventType::Ringing,
        EventType::Hangup,
    ];

    /// Wire name of the event type (also used as the failure error code)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NewInboundCall => "NEW_INBOUND_CALL",
            EventType::NewOutboundCall => "NEW_OUTBOUND_CALL",
            EventType::ActionSuccessful => "ACTION_SUCCESSFUL",
            EventType::ActionFailed => "ACTION_FAILED",
            EventType::ActionInterrupted => "ACTION_INTERRUPTED",
            EventType::CallAnswered => "CALL_ANSWERED",
            EventType::CallUpdateRequested => "CALL_UPDATE_REQUESTED",
            EventType::DigitsReceived => "DIGITS_RECEIVED",
            EventType::InvalidLambdaResponse => "INVALID_LAMBDA_RESPONSE",
            EventType::Ringing => "RINGING",
            EventType::Hangup => "HANGUP",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

/// Leg tag of a participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LegTag {
    /// The originating leg
    LegA,
    LegB,
    /// Any call-specific tag
    Other(String),
}

impl From<String> for LegTag {
    fn from(value: String) -> Self {
        match value.as_str() {
            "LEG-A" => LegTag::LegA,
            "LEG-B" => LegTag::LegB,
            _ => LegTag::Other(value),
        }
    }
}

impl From<LegTag> for String {
    fn from(tag: LegTag) -> Self {
        tag.to_string()
    }
}

impl fmt::Display for LegTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegTag::LegA => f.write_str("LEG-A"),
            LegTag::LegB => f.write_str("LEG-B"),
            LegTag::Other(tag) => f.write_str(tag),
        }
    }
}

/// Direction of a call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Connection status of a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParticipantStatus {
    Connected,
    Disconnected,
    Other(String),
}

impl Default for ParticipantStatus {
    // An event that omits the status describes a connected leg
    fn default() -> Self {
        Self::Connected
    }
}

impl From<String> for ParticipantStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Connected" => ParticipantStatus::Connected,
            "Disconnected" => ParticipantStatus::Disconnected,
            _ => ParticipantStatus::Other(value),
        }
    }
}

impl From<ParticipantStatus> for String {
    fn from(status: ParticipantStatus) -> Self {
        match status {
            ParticipantStatus::Connected => "Connected".to_string(),
            ParticipantStatus::Disconnected => "Disconnected".to_string(),
            ParticipantStatus::Other(other) => other,
        }
    }
}

/// One leg of the call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Participant {
    #[serde(rename = "ParticipantTag")]
    pub tag: LegTag,

    pub direction: Direction,

    pub to: String,

    pub from: String,

    #[serde(default)]
    pub status: ParticipantStatus,
}

impl Participant {
    pub fn is_connected(&self) -> bool {
        self.status == ParticipantStatus::Connected
    }

    pub fn is_disconnected(&self) -> bool {
        self.status == ParticipantStatus::Disconnected
    }
}

/// Correlation attributes carried between invocations of the same call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactionAttributes {
    pub wait_token: Option<String>,
    pub queue_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallDetails {
    pub transaction_id: String,

    #[serde(default)]
    pub transaction_attributes: Option<TransactionAttributes>,

    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionParameters {
    pub participant_tag: Option<LegTag>,
}

/// Details of the action an ACTION_* or HANGUP event refers to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionData {
    #[serde(default)]
    pub parameters: Option<ActionParameters>,

    pub error_message: Option<String>,
}

/// Typed view of an invocation event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvocationEvent {
    pub invocation_event_type: EventType,

    pub call_details: CallDetails,

    #[serde(default)]
    pub action_data: Option<ActionData>,
}

impl InvocationEvent {
    /// Tag of the leg named in the action parameters (the hung-up leg for HANGUP)
    pub fn action_participant_tag(&self) -> Option<&LegTag> {
        self.action_data
            .as_ref()
            .and_then(|d| d.parameters.as_ref())
            .and_then(|p| p.participant_tag.as_ref())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.action_data
            .as_ref()
            .and_then(|d| d.error_message.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        for event_type in EventType::ALL {
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type.as_str()));
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        assert!("CALL_TRANSFERRED".parse::<EventType>().is_err());
    }

    #[test]
    fn test_missing_status_defaults_to_connected() {
        let participant: Participant = serde_json::from_value(serde_json::json!({
            "ParticipantTag": "LEG-A",
            "Direction": "Inbound",
            "To": "+15551234567",
            "From": "+15559999999"
        }))
        .unwrap();

        assert_eq!(participant.status, ParticipantStatus::Connected);
        assert!(participant.is_connected());
    }

    #[test]
    fn test_custom_leg_tag_round_trips() {
        let tag: LegTag = serde_json::from_str("\"LEG-C\"").unwrap();
        assert_eq!(tag, LegTag::Other("LEG-C".to_string()));
        assert_eq!(serde_json::to_string(&tag).unwrap(), "\"LEG-C\"");
    }

    #[test]
    fn test_action_data_accessors() {
        let event: InvocationEvent = serde_json::from_value(serde_json::json!({
            "InvocationEventType": "HANGUP",
            "CallDetails": {
                "TransactionId": "T1",
                "Participants": []
            },
            "ActionData": {
                "Type": "Hangup",
                "Parameters": { "ParticipantTag": "LEG-B", "SipResponseCode": "0" },
                "ErrorMessage": "busy"
            }
        }))
        .unwrap();

        assert_eq!(event.action_participant_tag(), Some(&LegTag::LegB));
        assert_eq!(event.error_message(), Some("busy"));
    }
}
