//! Response and event payloads
//!
//! These are the shapes clients receive, either as the answer to a request
//! or as the payload of a broadcast event. Optional fields serialize as
//! `null`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::{
    arbiter::PuzzleView,
    colors::ColorConflict,
    error::{Error, ErrorKind},
    ids::{PuzzleId, SessionId, TeamId, UserId},
    session::SessionStatus,
};

/// A user as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResponse {
    /// User id
    pub id: UserId,
    /// Username
    pub username: String,
    /// Team the user belongs to
    pub team_id: Option<TeamId>,
    /// Color the user holds in that team
    pub color: Option<String>,
}

/// Whether a team can take more members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// At least one seat is free
    Open,
    /// Every seat is taken
    Full,
    /// The team's session has left the lobby
    Playing,
}

/// A team as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableTeam {
    /// Team id
    pub id: TeamId,
    /// Team name
    pub name: String,
    /// Members ordered by id
    pub members: Vec<UserResponse>,
    /// Number of members
    pub player_count: usize,
    /// Seat limit, `null` when unbounded
    pub max_players: Option<usize>,
    /// Whether the team takes more members
    pub status: TeamStatus,
    /// Most recent session of the team
    pub game_session_id: Option<SessionId>,
    /// Status of that session
    pub game_status: Option<SessionStatus>,
}

/// Outcome of a color operation
///
/// Failures of color operations are reported in this shape too, with
/// `success` set to `false`.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorAssignmentResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// User id to new color, for every user whose color changed
    pub reassignments: Option<BTreeMap<String, String>>,
    /// Conflicts found before resolving
    pub conflicts: Option<Vec<ColorConflict>>,
}

impl ColorAssignmentResponse {
    /// A failed color operation
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            reassignments: None,
            conflicts: None,
        }
    }
}

/// Result of checking a team's colors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamColorValidation {
    /// Whether no color is held twice
    pub is_valid: bool,
    /// Every duplicated color
    pub conflicts: Vec<ColorConflict>,
}

/// Outcome of an answer submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PuzzleAnswerResponse {
    /// Whether this submission's answer was correct
    pub correct: bool,
    /// Winner credited by this submission
    pub awarded_to_user_id: Option<UserId>,
    /// Points credited by this submission
    pub points_awarded: u64,
    /// Next puzzle of the session once this one is closed
    pub next_puzzle_id: Option<PuzzleId>,
    /// Content of that puzzle
    pub next_puzzle: Option<PuzzleView>,
}

/// A session as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameSessionResponse {
    /// Session id
    pub id: SessionId,
    /// Team playing
    pub team_id: TeamId,
    /// Current status
    pub status: SessionStatus,
    /// First puzzle not yet solved, while the session is active
    pub current_puzzle_id: Option<PuzzleId>,
    /// Creation time in epoch milliseconds
    pub created_at: u64,
    /// Time the session became active
    pub started_at: Option<u64>,
    /// Time the session finished
    pub ended_at: Option<u64>,
    /// Seconds between start and finish
    pub survival_time_seconds: Option<u64>,
}

/// A member's balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerPoints {
    /// Member id
    pub user_id: UserId,
    /// Member's username
    pub username: String,
    /// Current balance
    pub points: u64,
    /// Whether the balance ran out
    pub eliminated: bool,
}

/// Balances of a team's members, highest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamPoints {
    /// Team id
    pub team_id: TeamId,
    /// Session the balances belong to
    pub session_id: Option<SessionId>,
    /// Members by balance
    pub players: Vec<PlayerPoints>,
}

/// A member's final standing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalPlayer {
    /// Member id
    pub user_id: UserId,
    /// Member's username
    pub username: String,
    /// Balance at the end of the session
    pub points: u64,
    /// Number of puzzles the member won
    pub puzzles_solved: usize,
}

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameResult {
    /// Session id
    pub session_id: SessionId,
    /// Team that played
    pub team_id: TeamId,
    /// Seconds between start and finish
    pub survival_time_seconds: Option<u64>,
    /// Puzzles won in total
    pub puzzles_solved: usize,
    /// Members by final balance
    pub players: Vec<FinalPlayer>,
}

/// A rejected request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureResponse {
    /// Always `false`
    pub success: bool,
    /// Class of the failure
    pub kind: ErrorKind,
    /// Human-readable reason
    pub message: String,
}

impl From<&Error> for FailureResponse {
    fn from(error: &Error) -> Self {
        Self {
            success: false,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_color_failure_omits_optional_fields() {
        let response = ColorAssignmentResponse::failure("no colors available in team 5");

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": false, "message": "no colors available in team 5"})
        );
    }

    #[test]
    fn test_failure_response_from_error() {
        let error = Error::from(crate::session::Error::Locked(SessionId::new(3)));
        let response = FailureResponse::from(&error);

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": false, "kind": "state", "message": "session 3 is locked"})
        );
    }

    #[test]
    fn test_answer_response_keeps_nulls() {
        let response = PuzzleAnswerResponse {
            correct: true,
            awarded_to_user_id: None,
            points_awarded: 0,
            next_puzzle_id: None,
            next_puzzle: None,
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "correct": true,
                "awarded_to_user_id": null,
                "points_awarded": 0,
                "next_puzzle_id": null,
                "next_puzzle": null
            })
        );
    }
}
