//! Game session lifecycle
//!
//! A session moves through `lobby → countdown → active → finished`, one step
//! at a time and never backwards. The status decides what the rest of the
//! coordinator may do: membership and colors only change in the lobby, and
//! answers are only accepted while the session is active.

use std::{fmt, sync::Arc, time::Duration};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use web_time::SystemTime;

use crate::{
    error::{Entity, ErrorKind, Result},
    ids::{IdSequence, PuzzleId, SessionId, TeamId, UserId},
    scores::Scoreboard,
};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Players gather and pick colors
    Lobby,
    /// Membership is frozen and the game is about to start
    Countdown,
    /// Answers are accepted
    Active,
    /// Read-only history
    Finished,
}

impl SessionStatus {
    /// The only status this one may move to
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Lobby => Some(Self::Countdown),
            Self::Countdown => Some(Self::Active),
            Self::Active => Some(Self::Finished),
            Self::Finished => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lobby => "lobby",
            Self::Countdown => "countdown",
            Self::Active => "active",
            Self::Finished => "finished",
        })
    }
}

/// Errors raised by the session state machine and its gates
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No session has this id
    #[error("session {0} not found")]
    NotFound(SessionId),
    /// Answers are only accepted while the session is active
    #[error("session {0} is not active")]
    NotActive(SessionId),
    /// Membership is frozen during countdown and play
    #[error("session {0} is locked")]
    Locked(SessionId),
    /// The session is over
    #[error("session {0} is finished")]
    Finished(SessionId),
    /// The requested status is not the next step
    #[error("cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: SessionStatus,
        /// Requested status
        to: SessionStatus,
    },
    /// The team already has a session that is not finished
    #[error("team {0} already has a running session")]
    AlreadyRunning(TeamId),
    /// The player's balance ran out
    #[error("user {0} has been eliminated")]
    PlayerEliminated(UserId),
    /// The player is not part of the session's team
    #[error("user {user} is not playing in session {session}")]
    NotPlaying {
        /// Submitting user
        user: UserId,
        /// Session the puzzle belongs to
        session: SessionId,
    },
    /// Results exist only once the session is finished
    #[error("session {0} has not finished yet")]
    NotFinished(SessionId),
}

impl Error {
    /// Classifies the error for clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::NotPlaying { .. } => ErrorKind::Validation,
            Self::AlreadyRunning(_) => ErrorKind::Conflict,
            Self::NotActive(_)
            | Self::Locked(_)
            | Self::Finished(_)
            | Self::InvalidTransition { .. }
            | Self::PlayerEliminated(_)
            | Self::NotFinished(_) => ErrorKind::State,
        }
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

/// A game played by one team
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    pub(crate) id: SessionId,
    pub(crate) team_id: TeamId,
    pub(crate) status: SessionStatus,
    pub(crate) puzzles: Vec<PuzzleId>,
    pub(crate) created_at: u64,
    pub(crate) started_at: Option<u64>,
    pub(crate) ended_at: Option<u64>,
}

impl GameSession {
    fn new(id: SessionId, team_id: TeamId, puzzles: Vec<PuzzleId>, now: u64) -> Self {
        Self {
            id,
            team_id,
            status: SessionStatus::Lobby,
            puzzles,
            created_at: now,
            started_at: None,
            ended_at: None,
        }
    }

    /// The session's id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The team playing
    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    /// Current status
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Puzzles in play order
    pub fn puzzles(&self) -> &[PuzzleId] {
        &self.puzzles
    }

    /// Creation time in epoch milliseconds
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Time the session became active
    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }

    /// Time the session finished
    pub fn ended_at(&self) -> Option<u64> {
        self.ended_at
    }

    /// Whole seconds between becoming active and finishing
    pub fn survival_time_seconds(&self) -> Option<u64> {
        Some(self.ended_at?.saturating_sub(self.started_at?) / 1000)
    }

    /// Moves the session one step forward
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless `target` is the next status.
    pub fn advance(&mut self, target: SessionStatus, now: u64) -> Result<SessionStatus, Error> {
        if self.status.next() != Some(target) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        match target {
            SessionStatus::Active => self.started_at = Some(now),
            SessionStatus::Finished => self.ended_at = Some(now),
            SessionStatus::Lobby | SessionStatus::Countdown => {}
        }
        let previous = std::mem::replace(&mut self.status, target);

        info!(
            session_id = %self.id,
            team_id = %self.team_id,
            from = %previous,
            to = %target,
            "session status changed"
        );
        Ok(previous)
    }

    /// Rejects membership and color changes outside the lobby
    ///
    /// # Errors
    ///
    /// Returns `Locked` during countdown and play, `Finished` afterwards.
    pub fn ensure_lobby(&self) -> Result<(), Error> {
        match self.status {
            SessionStatus::Lobby => Ok(()),
            SessionStatus::Countdown | SessionStatus::Active => Err(Error::Locked(self.id)),
            SessionStatus::Finished => Err(Error::Finished(self.id)),
        }
    }

    /// Rejects operations on a finished session
    ///
    /// # Errors
    ///
    /// Returns `Finished` once the session is over.
    pub fn ensure_not_finished(&self) -> Result<(), Error> {
        if self.status == SessionStatus::Finished {
            Err(Error::Finished(self.id))
        } else {
            Ok(())
        }
    }

    /// Rejects answers outside of play
    ///
    /// # Errors
    ///
    /// Returns `NotActive` unless the session is active.
    pub fn ensure_active(&self) -> Result<(), Error> {
        if self.status == SessionStatus::Active {
            Ok(())
        } else {
            Err(Error::NotActive(self.id))
        }
    }
}

/// A session and its scoreboard
///
/// Status changes take the write lock; answer submissions take the read
/// lock, so answers to different puzzles are judged in parallel while no
/// answer ever overlaps a status change. The scoreboard has its own short
/// lock for crediting winners.
#[derive(Debug)]
pub struct SessionRecord {
    state: RwLock<GameSession>,
    scores: Mutex<Scoreboard>,
}

impl SessionRecord {
    /// Locks the scoreboard
    pub fn scores(&self) -> parking_lot::MutexGuard<'_, Scoreboard> {
        self.scores.lock()
    }
}

/// Owner of all sessions
#[derive(Debug)]
pub struct SessionBook {
    sessions: DashMap<SessionId, Arc<SessionRecord>>,
    ids: IdSequence,
    lock_timeout: Duration,
}

impl SessionBook {
    /// Creates an empty book
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ids: IdSequence::default(),
            lock_timeout,
        }
    }

    /// Allocates an id for a session about to be created
    pub fn next_id(&self) -> SessionId {
        self.ids.next()
    }

    /// Stores a new session in the lobby
    pub fn insert(&self, id: SessionId, team_id: TeamId, puzzles: Vec<PuzzleId>) -> GameSession {
        let session = GameSession::new(id, team_id, puzzles, epoch_millis());
        self.sessions.insert(
            id,
            Arc::new(SessionRecord {
                state: RwLock::new(session.clone()),
                scores: Mutex::new(Scoreboard::default()),
            }),
        );
        debug!(session_id = %id, team_id = %team_id, "session created");
        session
    }

    fn record(&self, id: SessionId) -> Result<Arc<SessionRecord>> {
        self.sessions
            .get(&id)
            .map(|record| Arc::clone(record.value()))
            .ok_or_else(|| Error::NotFound(id).into())
    }

    /// Runs `f` with shared access to the session
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Busy` if the lock is not acquired in time, or
    /// whatever `f` returns.
    pub fn read<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&GameSession, &SessionRecord) -> Result<R>,
    ) -> Result<R> {
        let record = self.record(id)?;
        let Some(state) = record.state.try_read_for(self.lock_timeout) else {
            debug!(session_id = %id, "session read lock timed out");
            return Err(crate::Error::Busy(Entity::Session(id)));
        };
        f(&state, &record)
    }

    /// Runs `f` with exclusive access to the session
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Busy` if the lock is not acquired in time, or
    /// whatever `f` returns.
    pub fn write<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut GameSession, &SessionRecord) -> Result<R>,
    ) -> Result<R> {
        let record = self.record(id)?;
        let Some(mut state) = record.state.try_write_for(self.lock_timeout) else {
            debug!(session_id = %id, "session write lock timed out");
            return Err(crate::Error::Busy(Entity::Session(id)));
        };
        f(&mut state, &record)
    }
}
