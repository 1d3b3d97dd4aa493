//! Outbound events
//!
//! Clients subscribe to a team or a session topic through the host's
//! transport. The coordinator reports every state change through a single
//! [`Publisher`], which the host implements over WebSockets, server-sent
//! events or whatever else it uses.

use serde::Serialize;

use crate::{
    ids::{SessionId, TeamId},
    responses::{
        AvailableTeam, ColorAssignmentResponse, GameSessionResponse, PuzzleAnswerResponse,
        TeamPoints,
    },
};

/// Channel an event is published on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, derive_more::Display)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Topic {
    /// Everyone watching a team
    #[display("team:{_0}")]
    Team(TeamId),
    /// Everyone playing or watching a session
    #[display("session:{_0}")]
    Session(SessionId),
}

/// A state change clients are told about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum Event {
    /// A member joined or left
    MembershipChanged(AvailableTeam),
    /// Colors changed within the team
    ColorReassigned(ColorAssignmentResponse),
    /// A puzzle was won
    PuzzleResolved(PuzzleAnswerResponse),
    /// The session moved to a new status
    SessionStatusChanged(GameSessionResponse),
    /// Balances changed after a decay
    PointsChanged(TeamPoints),
}

impl Event {
    /// Serializes the event to JSON
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which does not happen for these
    /// plain-data payloads.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Sink for outbound events
///
/// Implementations must not block: events are published while the affected
/// team or session is locked, which keeps their order consistent with the
/// order of the changes they describe.
pub trait Publisher: Send + Sync {
    /// Delivers `event` to every subscriber of `topic`
    fn broadcast(&self, topic: &Topic, event: &Event);
}

impl<P: Publisher + ?Sized> Publisher for std::sync::Arc<P> {
    fn broadcast(&self, topic: &Topic, event: &Event) {
        (**self).broadcast(topic, event);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ids::UserId;

    #[test]
    fn test_topic_display() {
        assert_eq!(Topic::Team(TeamId::new(5)).to_string(), "team:5");
        assert_eq!(Topic::Session(SessionId::new(2)).to_string(), "session:2");
    }

    #[test]
    fn test_event_message_is_tagged() {
        let event = Event::PuzzleResolved(PuzzleAnswerResponse {
            correct: true,
            awarded_to_user_id: Some(UserId::new(1)),
            points_awarded: 10,
            next_puzzle_id: None,
            next_puzzle: None,
        });

        let message: serde_json::Value = serde_json::from_str(&event.to_message()).unwrap();
        assert_eq!(message["event"], json!("puzzle_resolved"));
        assert_eq!(message["payload"]["awarded_to_user_id"], json!(1));
    }
}
