//! Answer arbitration
//!
//! Many members of a team may submit answers to the same puzzle at once. The
//! arbiter makes sure exactly one correct submission wins each puzzle: every
//! puzzle owns a set-once award slot, and the first correct submission to
//! fill it is the winner. Later correct submissions are still recognized as
//! correct but earn nothing. An award is never revoked.
//!
//! Submissions to an open puzzle are stamped, judged and claimed one at a
//! time under a per-puzzle lock, so the award always goes to the earliest
//! stamped correct answer however long the answer check takes.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    error::ErrorKind,
    ids::{PuzzleId, SessionId, UserId},
};

/// Errors raised while registering puzzles or judging answers
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No puzzle has this id
    #[error("puzzle {0} not found")]
    PuzzleNotFound(PuzzleId),
    /// A puzzle with this id is already registered
    #[error("puzzle {0} is already registered")]
    DuplicatePuzzle(PuzzleId),
    /// Another submission to the puzzle was judged for too long
    #[error("puzzle {0} is busy, try again")]
    Busy(PuzzleId),
    /// The puzzle was already won
    #[error("puzzle {puzzle} was already solved by user {winner}")]
    AlreadyAwarded {
        /// Puzzle that was contested
        puzzle: PuzzleId,
        /// Holder of the award
        winner: UserId,
    },
}

impl Error {
    /// Classifies the error for clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PuzzleNotFound(_) => ErrorKind::Validation,
            Self::DuplicatePuzzle(_) | Self::AlreadyAwarded { .. } => ErrorKind::Conflict,
            Self::Busy(_) => ErrorKind::Unavailable,
        }
    }
}

/// Decides whether an answer solves a puzzle
pub trait AnswerCheck: Send + Sync {
    /// Whether `answer` is a correct answer
    fn is_correct(&self, answer: &str) -> bool;
}

impl<F> AnswerCheck for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_correct(&self, answer: &str) -> bool {
        self(answer)
    }
}

/// Accepts exactly one answer, ignoring surrounding whitespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactAnswer(pub String);

impl AnswerCheck for ExactAnswer {
    fn is_correct(&self, answer: &str) -> bool {
        answer.trim() == self.0
    }
}

/// A puzzle supplied by the content source
#[derive(Clone)]
pub struct Puzzle {
    /// Id assigned by the content source
    pub id: PuzzleId,
    /// Points awarded to the winner; the configured default applies when `None`
    pub points: Option<u64>,
    /// Opaque content shown to players
    pub data: serde_json::Value,
    check: Arc<dyn AnswerCheck>,
}

impl fmt::Debug for Puzzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Puzzle")
            .field("id", &self.id)
            .field("points", &self.points)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl Puzzle {
    /// Creates a puzzle judged by `check`
    pub fn new(id: PuzzleId, check: impl AnswerCheck + 'static) -> Self {
        Self {
            id,
            points: None,
            data: serde_json::Value::Null,
            check: Arc::new(check),
        }
    }

    /// Creates a puzzle with a single accepted answer
    pub fn exact(id: PuzzleId, answer: impl Into<String>) -> Self {
        Self::new(id, ExactAnswer(answer.into()))
    }

    /// Sets the points awarded to the winner
    #[must_use]
    pub fn with_points(mut self, points: u64) -> Self {
        self.points = Some(points);
        self
    }

    /// Attaches content shown to players
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Puzzle content as sent to players, without its answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleView {
    /// Puzzle id
    pub id: PuzzleId,
    /// Points awarded to the winner
    pub points: u64,
    /// Opaque content
    pub data: serde_json::Value,
}

/// The credit granted for solving a puzzle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Award {
    /// Winning user
    pub user_id: UserId,
    /// Points credited
    pub points: u64,
    /// Time the winning submission was stamped, in epoch milliseconds
    pub timestamp: u64,
    /// Position of the submission in arrival order
    pub arrival: u64,
}

/// A submitted answer
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    /// Puzzle answered
    pub puzzle_id: PuzzleId,
    /// Submitting user
    pub user_id: UserId,
    /// The answer
    pub answer: &'a str,
}

/// The judgement of one submission
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Whether the answer was correct
    pub correct: bool,
    /// The award granted to this submission, if it won
    pub award: Option<Award>,
    /// The winning award, once the puzzle is closed
    pub winner: Option<Award>,
    /// The puzzle that follows in the session once this one is closed
    pub next_puzzle: Option<PuzzleView>,
}

#[derive(Debug)]
struct PuzzleSlot {
    puzzle: Puzzle,
    session_id: SessionId,
    points: u64,
    next: Option<PuzzleId>,
    judging: Mutex<()>,
    award: OnceLock<Award>,
}

impl PuzzleSlot {
    fn view(&self) -> PuzzleView {
        PuzzleView {
            id: self.puzzle.id,
            points: self.points,
            data: self.puzzle.data.clone(),
        }
    }
}

/// Judges answers and grants at most one award per puzzle
#[derive(Debug)]
pub struct PuzzleArbiter {
    slots: DashMap<PuzzleId, Arc<PuzzleSlot>>,
    arrivals: AtomicU64,
    lock_timeout: Duration,
}

impl PuzzleArbiter {
    /// Creates an arbiter without puzzles
    ///
    /// A submission waits at most `lock_timeout` for the submission to the
    /// same puzzle that is being judged ahead of it.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            arrivals: AtomicU64::new(0),
            lock_timeout,
        }
    }

    /// Registers the ordered puzzles of a session
    ///
    /// Either every puzzle is registered or none is.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePuzzle` if an id is repeated or already registered.
    pub fn register(
        &self,
        session_id: SessionId,
        puzzles: &[Puzzle],
        default_points: u64,
    ) -> Result<(), Error> {
        let mut seen = HashSet::with_capacity(puzzles.len());
        if let Some(repeated) = puzzles.iter().find(|puzzle| !seen.insert(puzzle.id)) {
            return Err(Error::DuplicatePuzzle(repeated.id));
        }

        let mut registered = Vec::with_capacity(puzzles.len());
        for (index, puzzle) in puzzles.iter().enumerate() {
            let slot = PuzzleSlot {
                puzzle: puzzle.clone(),
                session_id,
                points: puzzle.points.unwrap_or(default_points),
                next: puzzles.get(index + 1).map(|next| next.id),
                judging: Mutex::new(()),
                award: OnceLock::new(),
            };
            let inserted = match self.slots.entry(puzzle.id) {
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::new(slot));
                    true
                }
                Entry::Occupied(_) => false,
            };
            if !inserted {
                self.retire(session_id, &registered);
                return Err(Error::DuplicatePuzzle(puzzle.id));
            }
            registered.push(puzzle.id);
        }
        debug!(session_id = %session_id, count = puzzles.len(), "puzzles registered");
        Ok(())
    }

    /// Drops the puzzles of a session that is over
    ///
    /// Puzzles registered by another session are left alone. Returns how many
    /// puzzles were dropped.
    pub fn retire(&self, session_id: SessionId, puzzles: &[PuzzleId]) -> usize {
        let retired = puzzles
            .iter()
            .filter(|id| {
                self.slots
                    .remove_if(*id, |_, slot| slot.session_id == session_id)
                    .is_some()
            })
            .count();
        debug!(session_id = %session_id, retired, "puzzles retired");
        retired
    }

    fn slot(&self, puzzle_id: PuzzleId) -> Result<Arc<PuzzleSlot>, Error> {
        self.slots
            .get(&puzzle_id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or(Error::PuzzleNotFound(puzzle_id))
    }

    /// Session the puzzle belongs to
    ///
    /// # Errors
    ///
    /// Returns `PuzzleNotFound` for an unknown id.
    pub fn session_of(&self, puzzle_id: PuzzleId) -> Result<SessionId, Error> {
        Ok(self.slot(puzzle_id)?.session_id)
    }

    /// Content of the puzzle as sent to players
    ///
    /// # Errors
    ///
    /// Returns `PuzzleNotFound` for an unknown id.
    pub fn view(&self, puzzle_id: PuzzleId) -> Result<PuzzleView, Error> {
        Ok(self.slot(puzzle_id)?.view())
    }

    /// The award of a closed puzzle
    pub fn winner(&self, puzzle_id: PuzzleId) -> Option<Award> {
        self.slots
            .get(&puzzle_id)
            .and_then(|slot| slot.award.get().copied())
    }

    /// Whether the puzzle has been won
    pub fn is_closed(&self, puzzle_id: PuzzleId) -> bool {
        self.winner(puzzle_id).is_some()
    }

    /// First puzzle of `sequence` that is still open
    pub fn current(&self, sequence: &[PuzzleId]) -> Option<PuzzleId> {
        sequence.iter().copied().find(|id| !self.is_closed(*id))
    }

    /// Attempts to close the puzzle with `award`
    ///
    /// # Errors
    ///
    /// Returns `PuzzleNotFound`, or `AlreadyAwarded` naming the existing
    /// winner when another award got there first.
    pub fn claim(&self, puzzle_id: PuzzleId, award: Award) -> Result<Award, Error> {
        let slot = self.slot(puzzle_id)?;
        match slot.award.set(award) {
            Ok(()) => Ok(award),
            Err(_) => {
                let winner = slot.award.get().map_or(award.user_id, |held| held.user_id);
                Err(Error::AlreadyAwarded {
                    puzzle: puzzle_id,
                    winner,
                })
            }
        }
    }

    /// Judges a submission
    ///
    /// A correct answer to an open puzzle closes it and wins its points; a
    /// correct answer that arrives after the puzzle closed earns nothing.
    /// `now` stamps the submission once it is its turn to be judged.
    ///
    /// # Errors
    ///
    /// Returns `PuzzleNotFound` for an unknown puzzle, or `Busy` if the
    /// submission judged ahead of this one takes longer than the lock bound.
    pub fn submit(
        &self,
        submission: Submission<'_>,
        now: impl FnOnce() -> u64,
    ) -> Result<Verdict, Error> {
        let slot = self.slot(submission.puzzle_id)?;
        let judging = match slot.award.get() {
            Some(_) => None,
            None => {
                let Some(guard) = slot.judging.try_lock_for(self.lock_timeout) else {
                    debug!(puzzle_id = %submission.puzzle_id, "puzzle judging lock timed out");
                    return Err(Error::Busy(submission.puzzle_id));
                };
                Some(guard)
            }
        }
        .filter(|_| slot.award.get().is_none());

        let (correct, award) = match judging {
            None => (slot.puzzle.check.is_correct(submission.answer), None),
            Some(_guard) => {
                let timestamp = now();
                let arrival = self.arrivals.fetch_add(1, Ordering::Relaxed);
                let correct = slot.puzzle.check.is_correct(submission.answer);
                let candidate = Award {
                    user_id: submission.user_id,
                    points: slot.points,
                    timestamp,
                    arrival,
                };
                let award = (correct && slot.award.set(candidate).is_ok()).then_some(candidate);
                if let Some(award) = award {
                    info!(
                        puzzle_id = %submission.puzzle_id,
                        user_id = %award.user_id,
                        points = award.points,
                        "puzzle solved"
                    );
                }
                (correct, award)
            }
        };
        if correct && award.is_none() {
            debug!(puzzle_id = %submission.puzzle_id, user_id = %submission.user_id, "correct answer after puzzle closed");
        }

        let winner = slot.award.get().copied();
        let next_puzzle = winner
            .and(slot.next)
            .and_then(|next| self.view(next).ok());

        Ok(Verdict {
            correct,
            award,
            winner,
            next_puzzle,
        })
    }
}
