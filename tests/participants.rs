//! Participant Resolution Tests
//!
//! Main-participant selection and call-end detection over every status
//! combination of one- and two-leg calls.

use callbridge::core::{resolve_main_participant, BridgeError, EventContext};
use callbridge::domain::{Direction, LegTag, Participant, ParticipantStatus};
use serde_json::json;

const STATUSES: [ParticipantStatus; 2] = [ParticipantStatus::Connected, ParticipantStatus::Disconnected];

fn leg(tag: LegTag, status: ParticipantStatus) -> Participant {
    Participant {
        tag,
        direction: Direction::Inbound,
        to: "+15551234567".to_string(),
        from: "+15559999999".to_string(),
        status,
    }
}

#[test]
fn test_single_leg_is_always_main() {
    for tag in [LegTag::LegA, LegTag::LegB] {
        for status in STATUSES {
            let participants = vec![leg(tag.clone(), status)];
            assert_eq!(resolve_main_participant(&participants).unwrap(), 0);
        }
    }
}

#[test]
fn test_leg_a_is_main_exactly_while_connected() {
    for a in STATUSES {
        for b in STATUSES {
            // Order in the event does not matter
            let forward = vec![leg(LegTag::LegA, a.clone()), leg(LegTag::LegB, b.clone())];
            let reverse = vec![leg(LegTag::LegB, b.clone()), leg(LegTag::LegA, a.clone())];

            for participants in [forward, reverse] {
                let main = &participants[resolve_main_participant(&participants).unwrap()];
                let expected = if a == ParticipantStatus::Connected {
                    LegTag::LegA
                } else {
                    LegTag::LegB
                };
                assert_eq!(main.tag, expected, "LEG-A {:?}, LEG-B {:?}", a, b);
            }
        }
    }
}

#[test]
fn test_other_counts_are_rejected() {
    assert!(matches!(
        resolve_main_participant(&[]),
        Err(BridgeError::InvalidParticipantCount(0))
    ));

    let three = vec![
        leg(LegTag::LegA, ParticipantStatus::Connected),
        leg(LegTag::LegB, ParticipantStatus::Connected),
        leg(LegTag::LegB, ParticipantStatus::Connected),
    ];
    assert!(matches!(
        resolve_main_participant(&three),
        Err(BridgeError::InvalidParticipantCount(3))
    ));
}

#[test]
fn test_two_legs_with_same_tag_are_malformed() {
    let participants = vec![
        leg(LegTag::LegA, ParticipantStatus::Connected),
        leg(LegTag::LegA, ParticipantStatus::Disconnected),
    ];
    assert!(matches!(
        resolve_main_participant(&participants),
        Err(BridgeError::MalformedEvent(_))
    ));
}

#[test]
fn test_call_ended_only_for_one_disconnected_leg() {
    let cases = [
        (vec![("LEG-A", "Disconnected")], true),
        (vec![("LEG-B", "Disconnected")], true),
        (vec![("LEG-A", "Connected")], false),
        (vec![("LEG-A", "Disconnected"), ("LEG-B", "Disconnected")], false),
        (vec![("LEG-A", "Connected"), ("LEG-B", "Disconnected")], false),
    ];

    for (legs, expected) in cases {
        let participants: Vec<_> = legs
            .iter()
            .map(|(tag, status)| {
                json!({
                    "ParticipantTag": tag,
                    "Direction": "Outbound",
                    "To": "+15551234567",
                    "From": "+15559999999",
                    "Status": status,
                })
            })
            .collect();
        let event = json!({
            "InvocationEventType": "HANGUP",
            "CallDetails": {
                "TransactionId": "T1",
                "TransactionAttributes": { "WaitToken": "tok", "QueueUrl": "memory://call_flow_T1" },
                "Participants": participants,
            },
        });

        let ctx = EventContext::from_event(event).unwrap();
        assert_eq!(ctx.is_call_ended(), expected, "{:?}", legs);
    }
}

#[test]
fn test_missing_status_counts_as_connected() {
    let event = json!({
        "InvocationEventType": "RINGING",
        "CallDetails": {
            "TransactionId": "T1",
            "Participants": [
                { "ParticipantTag": "LEG-A", "Direction": "Inbound", "To": "+1", "From": "+2" },
                { "ParticipantTag": "LEG-B", "Direction": "Inbound", "To": "+1", "From": "+2", "Status": "Disconnected" },
            ],
        },
    });

    let ctx = EventContext::from_event(event).unwrap();
    assert_eq!(ctx.main_participant().tag, LegTag::LegA);
}

#[test]
fn test_call_specific_tag_takes_over_from_disconnected_leg_a() {
    let event = json!({
        "InvocationEventType": "CALL_UPDATE_REQUESTED",
        "CallDetails": {
            "TransactionId": "T1",
            "TransactionAttributes": { "WaitToken": "tok", "QueueUrl": "memory://call_flow_T1" },
            "Participants": [
                { "ParticipantTag": "LEG-A", "Direction": "Inbound", "To": "+1", "From": "+2", "Status": "Disconnected" },
                { "ParticipantTag": "LEG-X", "Direction": "Inbound", "To": "+1", "From": "+2", "Status": "Connected" },
            ],
        },
    });

    let ctx = EventContext::from_event(event).unwrap();
    assert_eq!(ctx.main_participant().tag, LegTag::Other("LEG-X".to_string()));
    assert!(!ctx.is_call_ended());
}
