//! Coordinator configuration
//!
//! Palette, capacity defaults and session timings are supplied by the host
//! rather than hard-coded. Every value has a default so a partially filled
//! configuration document deserializes, and [`Config::validated`] checks the
//! result against the bounds in [`crate::constants`].

use std::{collections::HashSet, time::Duration};

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{locking, palette, points, session, team},
    names::NameStyle,
};

type ValidationResult = garde::Result;

/// Validates that a duration in whole seconds falls within `[MIN_SECONDS, MAX_SECONDS]`
fn validate_duration<const MIN_SECONDS: u64, const MAX_SECONDS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    if (MIN_SECONDS..=MAX_SECONDS).contains(&val.as_secs()) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN_SECONDS},{MAX_SECONDS}]",
        )))
    }
}

fn validate_countdown(val: &Duration) -> ValidationResult {
    validate_duration::<{ session::MIN_COUNTDOWN }, { session::MAX_COUNTDOWN }>("countdown", val)
}

fn validate_decay_interval(val: &Duration) -> ValidationResult {
    validate_duration::<{ session::MIN_DECAY_INTERVAL }, { session::MAX_DECAY_INTERVAL }>(
        "decay interval",
        val,
    )
}

fn validate_lock_timeout(val: &Duration) -> ValidationResult {
    let millis = val.as_millis();
    if millis == 0 || millis > u128::from(locking::MAX_TIMEOUT) {
        Err(garde::Error::new(format!(
            "lock timeout must be within (0,{}] milliseconds",
            locking::MAX_TIMEOUT
        )))
    } else {
        Ok(())
    }
}

#[allow(clippy::ptr_arg)]
fn validate_palette(val: &Vec<String>) -> ValidationResult {
    let mut seen = HashSet::new();
    match val.iter().find(|color| !seen.insert(color.as_str())) {
        Some(duplicate) => Err(garde::Error::new(format!(
            "palette lists {duplicate} more than once"
        ))),
        None => Ok(()),
    }
}

/// Runtime configuration of a [`crate::coordinator::Coordinator`]
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Colors handed out within a team, smallest index first
    #[garde(
        length(min = 1, max = palette::MAX_SIZE),
        inner(length(min = 1, max = palette::MAX_COLOR_LENGTH)),
        custom(|v, _| validate_palette(v))
    )]
    pub palette: Vec<String>,

    /// Capacity given to teams created without an explicit one
    #[garde(range(min = 1, max = team::MAX_PLAYER_COUNT))]
    pub default_max_players: usize,

    /// Delay between entering `countdown` and becoming `active`
    #[garde(custom(|v, _| validate_countdown(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub countdown: Duration,

    /// Upper bound on waiting for a team or session lock
    #[garde(custom(|v, _| validate_lock_timeout(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub lock_timeout: Duration,

    /// Balance every member receives when a session becomes active
    #[garde(range(min = 1))]
    pub starting_points: u64,

    /// Value of a puzzle that does not carry its own
    #[garde(skip)]
    pub points_per_puzzle: u64,

    /// Time between two point decays in an active session
    #[garde(custom(|v, _| validate_decay_interval(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub decay_interval: Duration,

    /// Points removed from each member on every decay
    #[garde(skip)]
    pub points_lost_per_decay: u64,

    /// Whether joining a team also hands out the smallest free color
    #[garde(skip)]
    pub assign_color_on_join: bool,

    /// Style of names generated for teams created without one
    #[garde(dive)]
    pub team_names: NameStyle,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            palette: palette::DEFAULT_COLORS
                .iter()
                .map(|color| (*color).to_owned())
                .collect(),
            default_max_players: team::DEFAULT_MAX_PLAYERS,
            countdown: Duration::from_secs(session::DEFAULT_COUNTDOWN),
            lock_timeout: Duration::from_millis(locking::DEFAULT_TIMEOUT),
            starting_points: points::STARTING,
            points_per_puzzle: points::PER_PUZZLE,
            decay_interval: Duration::from_secs(session::DEFAULT_DECAY_INTERVAL),
            points_lost_per_decay: points::LOST_PER_DECAY,
            assign_color_on_join: false,
            team_names: NameStyle::default(),
        }
    }
}

/// The configuration failed validation
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfig(String);

impl Config {
    /// Validates the configuration, returning it unchanged when it is usable
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`] describing every violated bound.
    pub fn validated(self) -> Result<Self, InvalidConfig> {
        self.validate()
            .map_err(|report| InvalidConfig(report.to_string()))?;
        Ok(self)
    }

    /// Parses and validates a JSON configuration document
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`] if the document is malformed or out of bounds.
    pub fn from_json(document: &str) -> Result<Self, InvalidConfig> {
        serde_json::from_str::<Self>(document)
            .map_err(|e| InvalidConfig(e.to_string()))?
            .validated()
    }
}
