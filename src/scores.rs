//! Point balances of a session
//!
//! Every member of the team starts an active session with the same balance.
//! Winning a puzzle adds its points, and at every decay tick each member
//! still in the game loses a fixed amount. A member whose balance reaches
//! zero is eliminated and may no longer submit answers.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;

use crate::ids::{PuzzleId, UserId};

/// A puzzle won during the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SolvedPuzzle {
    /// The puzzle
    pub puzzle_id: PuzzleId,
    /// The winner
    pub user_id: UserId,
    /// Points credited
    pub points: u64,
}

/// Balances and award history of one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scoreboard {
    balances: BTreeMap<UserId, u64>,
    solved: Vec<SolvedPuzzle>,
    decays: u64,
}

impl Scoreboard {
    /// Gives every member `starting` points
    pub fn seed<I: IntoIterator<Item = UserId>>(members: I, starting: u64) -> Self {
        Self {
            balances: members.into_iter().map(|id| (id, starting)).collect(),
            ..Self::default()
        }
    }

    /// Credits the winner of a puzzle
    pub fn credit(&mut self, puzzle_id: PuzzleId, user_id: UserId, points: u64) {
        let balance = self.balances.entry(user_id).or_default();
        *balance = balance.saturating_add(points);
        self.solved.push(SolvedPuzzle {
            puzzle_id,
            user_id,
            points,
        });
    }

    /// Removes `amount` points from every member still in the game
    ///
    /// # Returns
    ///
    /// The members eliminated by this decay
    pub fn decay(&mut self, amount: u64) -> Vec<UserId> {
        self.decays += 1;
        self.balances
            .iter_mut()
            .filter(|(_, balance)| **balance > 0)
            .filter_map(|(id, balance)| {
                *balance = balance.saturating_sub(amount);
                (*balance == 0).then_some(*id)
            })
            .collect()
    }

    /// Current balance of a member
    pub fn balance(&self, user_id: UserId) -> Option<u64> {
        self.balances.get(&user_id).copied()
    }

    /// Whether the member's balance ran out
    pub fn is_eliminated(&self, user_id: UserId) -> bool {
        self.balance(user_id) == Some(0)
    }

    /// Whether every member has been eliminated
    pub fn all_eliminated(&self) -> bool {
        !self.balances.is_empty() && self.balances.values().all(|balance| *balance == 0)
    }

    /// Members by balance, highest first, ties broken by id
    pub fn standings(&self) -> Vec<(UserId, u64)> {
        self.balances
            .iter()
            .map(|(id, balance)| (*id, *balance))
            .sorted_by(|(a_id, a), (b_id, b)| b.cmp(a).then(a_id.cmp(b_id)))
            .collect()
    }

    /// Number of puzzles each member won
    pub fn solved_counts(&self) -> BTreeMap<UserId, usize> {
        self.solved.iter().counts_by(|solved| solved.user_id).into_iter().collect()
    }

    /// Puzzles won so far, in award order
    pub fn solved(&self) -> &[SolvedPuzzle] {
        &self.solved
    }

    /// Number of decay ticks applied
    pub fn decays(&self) -> u64 {
        self.decays
    }
}
