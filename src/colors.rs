//! Color assignment within a team
//!
//! Every member of a team may hold one color from the configured palette and
//! no two members may hold the same one. All functions here operate on a
//! [`Team`] the caller has already locked, so checking and assigning a color
//! is a single atomic step with respect to other operations on that team.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    error::ErrorKind,
    ids::{TeamId, UserId},
    registry::Team,
};

/// Errors raised while assigning colors
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Every palette color is held by another member
    #[error("no colors available in team {0}")]
    PaletteExhausted(TeamId),
    /// The preferred color is not part of the palette
    #[error("color {0} is not part of the palette")]
    UnknownColor(String),
    /// The user is not a member of the team
    #[error("user {user} is not a member of team {team}")]
    NotAMember {
        /// User the color was requested for
        user: UserId,
        /// Team the request targeted
        team: TeamId,
    },
    /// The team holds duplicate colors that must be resolved first
    #[error("team {0} has duplicate colors, resolve conflicts first")]
    DuplicateColors(TeamId),
}

impl Error {
    /// Classifies the error for clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PaletteExhausted(_) => ErrorKind::Capacity,
            Self::UnknownColor(_) | Self::NotAMember { .. } => ErrorKind::Validation,
            Self::DuplicateColors(_) => ErrorKind::Conflict,
        }
    }
}

/// A color held by more than one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorConflict {
    /// The shared color
    pub color: String,
    /// Holders in ascending id order
    pub user_ids: Vec<UserId>,
    /// Number of holders
    pub count: usize,
}

/// Outcome of a single assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Color the user holds afterwards
    pub color: String,
    /// Whether the user's color changed
    pub changed: bool,
    /// Whether the user asked for a color they did not receive
    pub preference_denied: bool,
}

/// Outcome of resolving duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Users moved to a new color
    pub reassignments: BTreeMap<UserId, String>,
    /// Users left without a color because the palette ran out
    pub uncolored: Vec<UserId>,
}

impl Resolution {
    /// Whether anything changed
    pub fn is_empty(&self) -> bool {
        self.reassignments.is_empty() && self.uncolored.is_empty()
    }
}

/// Colors used and still free in a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableColors {
    /// Free colors in palette order
    pub available_colors: Vec<String>,
    /// Colors held by at least one member
    pub used_colors: Vec<String>,
}

/// Hands out palette colors within teams
#[derive(Debug, Clone)]
pub struct ColorEngine {
    palette: Vec<String>,
}

impl ColorEngine {
    /// Creates an engine over `palette`, which is ordered by preference
    pub fn new(palette: Vec<String>) -> Self {
        Self { palette }
    }

    /// The configured palette
    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    fn smallest_unused(&self, taken: &HashSet<&str>) -> Option<&str> {
        self.palette
            .iter()
            .map(String::as_str)
            .find(|color| !taken.contains(color))
    }

    /// Colors shared by two or more members, ordered by color
    pub fn conflicts(&self, team: &Team) -> Vec<ColorConflict> {
        team.colors
            .iter()
            .map(|(user_id, color)| (color.as_str(), *user_id))
            .into_group_map()
            .into_iter()
            .filter(|(_, holders)| holders.len() > 1)
            .map(|(color, holders)| {
                let user_ids: Vec<_> = holders.into_iter().sorted().collect();
                ColorConflict {
                    color: color.to_owned(),
                    count: user_ids.len(),
                    user_ids,
                }
            })
            .sorted_by(|a, b| a.color.cmp(&b.color))
            .collect()
    }

    /// Gives `user_id` a color that no other member holds
    ///
    /// A free preferred color is granted. Without a preference, or with the
    /// color the user already holds, an existing color is kept. Otherwise the
    /// first free palette color is picked; a user who already holds a color
    /// keeps it when their preference is taken.
    ///
    /// # Errors
    ///
    /// * `Error::NotAMember` - The user is not in the team
    /// * `Error::UnknownColor` - The preference is not in the palette
    /// * `Error::DuplicateColors` - The team must be resolved first
    /// * `Error::PaletteExhausted` - No color is free
    pub fn assign(
        &self,
        team: &mut Team,
        user_id: UserId,
        preferred: Option<&str>,
    ) -> Result<Assignment, Error> {
        if !team.has_member(user_id) {
            return Err(Error::NotAMember {
                user: user_id,
                team: team.id,
            });
        }
        if let Some(color) = preferred
            && !self.palette.iter().any(|known| known == color)
        {
            return Err(Error::UnknownColor(color.to_owned()));
        }
        if !self.conflicts(team).is_empty() {
            warn!(team_id = %team.id, "assignment refused, team holds duplicate colors");
            return Err(Error::DuplicateColors(team.id));
        }

        let current = team.colors.get(&user_id).cloned();
        let taken: HashSet<&str> = team
            .colors
            .iter()
            .filter(|(holder, _)| **holder != user_id)
            .map(|(_, color)| color.as_str())
            .collect();

        let (color, preference_denied) = match (preferred, &current) {
            (Some(wanted), _) if !taken.contains(wanted) => (wanted.to_owned(), false),
            (Some(_), Some(held)) => (held.clone(), true),
            (None, Some(held)) => (held.clone(), false),
            (preferred, None) => {
                let color = self
                    .smallest_unused(&taken)
                    .ok_or(Error::PaletteExhausted(team.id))?
                    .to_owned();
                (color, preferred.is_some())
            }
        };

        let changed = current.as_deref() != Some(color.as_str());
        if changed {
            team.colors.insert(user_id, color.clone());
            info!(team_id = %team.id, user_id = %user_id, color = %color, "color assigned");
        }
        debug_assert!(self.conflicts(team).is_empty());

        Ok(Assignment {
            color,
            changed,
            preference_denied,
        })
    }

    /// Frees the color held by `user_id`, returning it
    pub fn release(&self, team: &mut Team, user_id: UserId) -> Option<String> {
        let released = team.colors.remove(&user_id);
        if let Some(color) = &released {
            debug!(team_id = %team.id, user_id = %user_id, color = %color, "color released");
        }
        released
    }

    /// Removes every duplicate color from the team
    ///
    /// Within each set of holders the smallest user id keeps the color; the
    /// others, taken in ascending id order, receive the first free palette
    /// color. Holders left over once the palette runs out lose their color.
    /// Running this on a team without duplicates changes nothing.
    pub fn resolve_conflicts(&self, team: &mut Team) -> Resolution {
        let surplus: BTreeSet<UserId> = self
            .conflicts(team)
            .into_iter()
            .flat_map(|conflict| conflict.user_ids.into_iter().skip(1))
            .collect();

        let mut resolution = Resolution::default();
        if surplus.is_empty() {
            return resolution;
        }

        let mut taken: HashSet<String> = team
            .colors
            .iter()
            .filter(|(holder, _)| !surplus.contains(*holder))
            .map(|(_, color)| color.clone())
            .collect();

        for user_id in surplus {
            let free = self
                .palette
                .iter()
                .find(|color| !taken.contains(color.as_str()))
                .cloned();
            match free {
                Some(color) => {
                    taken.insert(color.clone());
                    team.colors.insert(user_id, color.clone());
                    resolution.reassignments.insert(user_id, color);
                }
                None => {
                    team.colors.remove(&user_id);
                    resolution.uncolored.push(user_id);
                }
            }
        }

        info!(
            team_id = %team.id,
            reassigned = resolution.reassignments.len(),
            uncolored = resolution.uncolored.len(),
            "color conflicts resolved"
        );
        debug_assert!(self.conflicts(team).is_empty());
        resolution
    }

    /// Free and used colors of the team
    pub fn available(&self, team: &Team) -> AvailableColors {
        let used: HashSet<&str> = team.colors.values().map(String::as_str).collect();
        let (used_colors, available_colors) = self
            .palette
            .iter()
            .cloned()
            .partition(|color| used.contains(color.as_str()));

        AvailableColors {
            available_colors,
            used_colors,
        }
    }
}
