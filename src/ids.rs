//! Entity identifiers
//!
//! Users, teams, sessions and puzzles are addressed by integer ids on the
//! wire. Each kind gets its own newtype so a team id can never be handed to
//! an operation expecting a user id.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
            derive_more::Display,
            derive_more::From,
            derive_more::FromStr,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw id
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw id
            pub const fn get(self) -> u64 {
                self.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a registered user
    UserId
);
entity_id!(
    /// Identifier of a team
    TeamId
);
entity_id!(
    /// Identifier of a game session
    SessionId
);
entity_id!(
    /// Identifier of a puzzle, assigned by the content source
    PuzzleId
);

/// Monotonic id allocator
///
/// Ids start at 1 and are never reused. Allocation is lock-free so that
/// registering users or teams never contends with per-team locks.
#[derive(Debug)]
pub struct IdSequence(AtomicU64);

impl Default for IdSequence {
    fn default() -> Self {
        Self(AtomicU64::new(1))
    }
}

impl IdSequence {
    /// Returns the next unused id
    pub fn next<T: From<u64>>(&self) -> T {
        T::from(self.0.fetch_add(1, Ordering::Relaxed))
    }

    /// Makes sure ids handed out later are strictly greater than `seen`
    ///
    /// Used when entities are restored with ids that were allocated elsewhere.
    pub fn observe(&self, seen: u64) {
        self.0.fetch_max(seen.saturating_add(1), Ordering::Relaxed);
    }
}
