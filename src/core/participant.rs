//! Main participant resolution.
//!
//! A call has one leg (the caller only) or two legs (caller and callee).
//! Routing decisions look at a single "main" participant: the lone leg, or
//! LEG-A while it is still connected, falling back to the other leg once it
//! is not. The other leg is usually LEG-B but may carry a call-specific tag.

use crate::domain::{LegTag, Participant};

use super::error::BridgeError;

/// Index of the main participant within `participants`
pub fn resolve_main_participant(participants: &[Participant]) -> Result<usize, BridgeError> {
    match participants.len() {
        1 => Ok(0),
        2 => {
            let leg_a = find_leg_a(participants)?;
            let other = 1 - leg_a;

            if participants[leg_a].is_connected() {
                Ok(leg_a)
            } else {
                Ok(other)
            }
        }
        count => Err(BridgeError::InvalidParticipantCount(count)),
    }
}

fn find_leg_a(participants: &[Participant]) -> Result<usize, BridgeError> {
    let mut matches = participants
        .iter()
        .enumerate()
        .filter(|(_, p)| p.tag == LegTag::LegA)
        .map(|(idx, _)| idx);

    match (matches.next(), matches.next()) {
        (Some(idx), None) => Ok(idx),
        (None, _) => Err(BridgeError::MalformedEvent(
            "two-leg call has no LEG-A participant".to_string(),
        )),
        (Some(_), Some(_)) => Err(BridgeError::MalformedEvent(
            "two-leg call has more than one LEG-A participant".to_string(),
        )),
    }
}
