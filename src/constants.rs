//! Configuration limits and defaults for the coordinator
//!
//! This module contains the bounds used to validate configuration and
//! incoming requests, and the defaults applied when a configuration value
//! is not supplied.

/// Team configuration constants
pub mod team {
    /// Largest capacity a team may be configured with
    pub const MAX_PLAYER_COUNT: usize = 64;
    /// Capacity used when neither the request nor the configuration sets one
    pub const DEFAULT_MAX_PLAYERS: usize = 4;
    /// Maximum length of a team name in characters
    pub const MAX_NAME_LENGTH: usize = 60;
    /// Generated names tried before giving up on an unnamed team
    pub const NAME_GENERATION_ATTEMPTS: usize = 100;
}

/// User configuration constants
pub mod user {
    /// Maximum length of a username in characters
    pub const MAX_NAME_LENGTH: usize = 30;
}

/// Palette configuration constants
pub mod palette {
    /// Colors handed out when no palette is configured, in preference order
    pub const DEFAULT_COLORS: [&str; 4] = ["red", "blue", "yellow", "green"];
    /// Maximum number of colors in a palette
    pub const MAX_SIZE: usize = 32;
    /// Maximum length of a single color name
    pub const MAX_COLOR_LENGTH: usize = 32;
}

/// Session timing constants (seconds unless stated otherwise)
pub mod session {
    /// Default countdown before a session becomes active
    pub const DEFAULT_COUNTDOWN: u64 = 5;
    /// Minimum configurable countdown
    pub const MIN_COUNTDOWN: u64 = 0;
    /// Maximum configurable countdown
    pub const MAX_COUNTDOWN: u64 = 60;
    /// Default interval between two point decays
    pub const DEFAULT_DECAY_INTERVAL: u64 = 5;
    /// Minimum configurable decay interval
    pub const MIN_DECAY_INTERVAL: u64 = 1;
    /// Maximum configurable decay interval
    pub const MAX_DECAY_INTERVAL: u64 = 600;
    /// Maximum number of puzzles in one session
    pub const MAX_PUZZLE_COUNT: usize = 1000;
}

/// Scoring constants
pub mod points {
    /// Balance every player starts an active session with
    pub const STARTING: u64 = 15;
    /// Points a solved puzzle is worth unless the puzzle says otherwise
    pub const PER_PUZZLE: u64 = 5;
    /// Points removed from each player on every decay
    pub const LOST_PER_DECAY: u64 = 1;
}

/// Locking constants (milliseconds)
pub mod locking {
    /// Default bound on waiting for a team or session lock
    pub const DEFAULT_TIMEOUT: u64 = 250;
    /// Maximum configurable bound
    pub const MAX_TIMEOUT: u64 = 10_000;
}

/// Answer text constants
pub mod answer_text {
    /// Maximum length of a submitted answer in characters
    pub const MAX_LENGTH: usize = 200;
}
