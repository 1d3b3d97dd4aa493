//! Team registry
//!
//! This module owns registered users, teams, and team membership. Each team
//! lives behind its own lock so operations on different teams run in
//! parallel while operations on the same team are serialized. Waiting for a
//! team lock is bounded; a caller that cannot get the lock in time receives
//! a `Busy` error instead of hanging.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use dashmap::DashMap;
use itertools::Itertools;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    colors::ColorEngine,
    constants,
    error::{Entity, ErrorKind, Result},
    ids::{IdSequence, SessionId, TeamId, UserId},
    names::{NameBook, NameStyle},
};

/// Errors raised by membership operations
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No team has this id
    #[error("team {0} not found")]
    TeamNotFound(TeamId),
    /// No user has this id
    #[error("user {0} not found")]
    UserNotFound(UserId),
    /// The team has no free seat
    #[error("team {0} is full")]
    TeamFull(TeamId),
    /// The user already belongs to a team
    #[error("user {0} is already assigned to a team")]
    UserAlreadyAssigned(UserId),
    /// The user does not belong to the team the operation targets
    #[error("user {0} is not in a team")]
    UserNotInTeam(UserId),
    /// A requested capacity is zero or above the supported maximum
    #[error("capacity {0} is out of bounds")]
    InvalidCapacity(usize),
    /// A restored team holds more members than its capacity
    #[error("team {0} holds more members than its capacity")]
    OverCapacity(TeamId),
    /// A restored team reuses an id that is already registered
    #[error("team {0} already exists")]
    TeamExists(TeamId),
}

impl Error {
    /// Classifies the error for clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TeamFull(_) | Self::OverCapacity(_) => ErrorKind::Capacity,
            Self::UserAlreadyAssigned(_) | Self::TeamExists(_) => ErrorKind::Conflict,
            Self::TeamNotFound(_)
            | Self::UserNotFound(_)
            | Self::UserNotInTeam(_)
            | Self::InvalidCapacity(_) => ErrorKind::Validation,
        }
    }
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique id
    pub id: UserId,
    /// Unique, validated username
    pub username: String,
    /// Team the user currently belongs to
    pub team_id: Option<TeamId>,
}

/// Seat limit requested for a new team
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    /// Use the configured default
    #[default]
    Default,
    /// At most this many members
    Bounded(usize),
    /// No limit
    Unbounded,
}

/// A team and its per-team state
///
/// Membership is only changed by [`TeamRegistry`]; the color map is only
/// changed by [`ColorEngine`].
#[derive(Debug, Clone)]
pub struct Team {
    pub(crate) id: TeamId,
    pub(crate) name: String,
    pub(crate) members: BTreeSet<UserId>,
    pub(crate) colors: BTreeMap<UserId, String>,
    pub(crate) max_players: Option<usize>,
    pub(crate) game_session_id: Option<SessionId>,
}

impl Team {
    /// The team's id
    pub fn id(&self) -> TeamId {
        self.id
    }

    /// The team's unique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members ordered by user id
    pub fn members(&self) -> impl Iterator<Item = UserId> + '_ {
        self.members.iter().copied()
    }

    /// Whether `user_id` is a member
    pub fn has_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }

    /// Number of members
    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    /// Seat limit, `None` when unbounded
    pub fn max_players(&self) -> Option<usize> {
        self.max_players
    }

    /// Whether one more member fits
    pub fn has_free_seat(&self) -> bool {
        self.max_players
            .is_none_or(|max_players| self.members.len() < max_players)
    }

    /// Color currently held by `user_id`
    pub fn color_of(&self, user_id: UserId) -> Option<&str> {
        self.colors.get(&user_id).map(String::as_str)
    }

    /// The most recent session created for this team
    pub fn game_session_id(&self) -> Option<SessionId> {
        self.game_session_id
    }
}

/// A member of a restored team with the color stored for them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    /// The member
    pub user_id: UserId,
    /// The color stored for the member, possibly shared with another member
    pub color: Option<String>,
}

/// A team as held by an external store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    /// Id the store knows the team by
    pub id: TeamId,
    /// Team name
    pub name: String,
    /// Seat limit
    pub max_players: Option<usize>,
    /// Members with their stored colors
    pub members: Vec<MemberSnapshot>,
}

/// Owner of users, teams and membership
#[derive(Debug)]
pub struct TeamRegistry {
    users: DashMap<UserId, User>,
    teams: DashMap<TeamId, Arc<Mutex<Team>>>,
    usernames: NameBook<UserId>,
    team_names: NameBook<TeamId>,
    user_ids: IdSequence,
    team_ids: IdSequence,
    default_max_players: usize,
    lock_timeout: Duration,
}

impl TeamRegistry {
    /// Creates an empty registry
    ///
    /// # Arguments
    ///
    /// * `default_max_players` - Capacity of teams created with [`Capacity::Default`]
    /// * `lock_timeout` - Upper bound on waiting for a team lock
    pub fn new(default_max_players: usize, lock_timeout: Duration) -> Self {
        Self {
            users: DashMap::new(),
            teams: DashMap::new(),
            usernames: NameBook::new(constants::user::MAX_NAME_LENGTH),
            team_names: NameBook::new(constants::team::MAX_NAME_LENGTH),
            user_ids: IdSequence::default(),
            team_ids: IdSequence::default(),
            default_max_players,
            lock_timeout,
        }
    }

    /// Registers a new user under a unique username
    ///
    /// # Errors
    ///
    /// Returns a name error if the username is invalid or taken.
    pub fn register_user(&self, username: &str) -> Result<User> {
        let id: UserId = self.user_ids.next();
        let username = self.usernames.claim(id, username)?;
        let user = User {
            id,
            username,
            team_id: None,
        };
        self.users.insert(id, user.clone());
        info!(user_id = %id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Returns a copy of the user record
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` for an unknown id.
    pub fn user(&self, user_id: UserId) -> Result<User> {
        self.users
            .get(&user_id)
            .map(|user| user.clone())
            .ok_or_else(|| Error::UserNotFound(user_id).into())
    }

    /// Returns the team `user_id` belongs to
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `UserNotInTeam`.
    pub fn team_of(&self, user_id: UserId) -> Result<TeamId> {
        self.user(user_id)?
            .team_id
            .ok_or_else(|| Error::UserNotInTeam(user_id).into())
    }

    fn resolve_capacity(&self, capacity: Capacity) -> Result<Option<usize>> {
        match capacity {
            Capacity::Default => Ok(Some(self.default_max_players)),
            Capacity::Unbounded => Ok(None),
            Capacity::Bounded(limit) if (1..=constants::team::MAX_PLAYER_COUNT).contains(&limit) => {
                Ok(Some(limit))
            }
            Capacity::Bounded(limit) => Err(Error::InvalidCapacity(limit).into()),
        }
    }

    /// Creates an empty team
    ///
    /// A missing name is generated in `style` until an unused one comes up.
    ///
    /// # Errors
    ///
    /// Returns a name error for an invalid or taken name, or
    /// `InvalidCapacity` for an out-of-range seat limit.
    pub fn create_team(
        &self,
        name: Option<&str>,
        capacity: Capacity,
        style: &NameStyle,
    ) -> Result<Team> {
        let max_players = self.resolve_capacity(capacity)?;
        let id: TeamId = self.team_ids.next();
        let name = match name {
            Some(name) => self.team_names.claim(id, name)?,
            None => self.team_names.claim_generated(id, style)?,
        };

        let team = Team {
            id,
            name,
            members: BTreeSet::new(),
            colors: BTreeMap::new(),
            max_players,
            game_session_id: None,
        };
        self.teams.insert(id, Arc::new(Mutex::new(team.clone())));
        info!(team_id = %id, name = %team.name, ?max_players, "team created");
        Ok(team)
    }

    /// Re-imports a team from an external store
    ///
    /// Stored colors are taken as they are, duplicates included. Every member
    /// must be registered and either unassigned or already pointing at this
    /// team. Nothing is changed unless the whole snapshot is accepted.
    ///
    /// # Errors
    ///
    /// Returns `TeamExists`, `OverCapacity`, `UserNotFound`,
    /// `UserAlreadyAssigned` or a name error.
    pub fn restore_team(&self, snapshot: TeamSnapshot) -> Result<Team> {
        let TeamSnapshot {
            id,
            name,
            max_players,
            members,
        } = snapshot;

        if let Some(limit) = max_players {
            self.resolve_capacity(Capacity::Bounded(limit))?;
        }
        if max_players.is_some_and(|limit| members.len() > limit) {
            return Err(Error::OverCapacity(id).into());
        }
        if self.teams.contains_key(&id) {
            return Err(Error::TeamExists(id).into());
        }
        for member in &members {
            match self.user(member.user_id)?.team_id {
                Some(other) if other != id => {
                    return Err(Error::UserAlreadyAssigned(member.user_id).into());
                }
                _ => {}
            }
        }

        let name = self.team_names.claim(id, &name)?;
        let team = Team {
            id,
            name,
            members: members.iter().map(|member| member.user_id).collect(),
            colors: members
                .iter()
                .filter_map(|member| Some((member.user_id, member.color.clone()?)))
                .collect(),
            max_players,
            game_session_id: None,
        };

        let restored = Arc::new(Mutex::new(team.clone()));
        let Some(_held) = restored.try_lock() else {
            return Err(crate::Error::Busy(Entity::Team(id)));
        };
        let inserted = match self.teams.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&restored));
                true
            }
        };
        if !inserted {
            self.team_names.release(id, &team.name);
            return Err(Error::TeamExists(id).into());
        }

        let mut moved = Vec::with_capacity(members.len());
        for member in &members {
            let conflict = match self.users.get_mut(&member.user_id) {
                None => Some(Error::UserNotFound(member.user_id)),
                Some(mut user) => match user.team_id {
                    Some(other) if other != id => Some(Error::UserAlreadyAssigned(member.user_id)),
                    current => {
                        if current.is_none() {
                            user.team_id = Some(id);
                            moved.push(member.user_id);
                        }
                        None
                    }
                },
            };
            if let Some(error) = conflict {
                for user_id in &moved {
                    if let Some(mut user) = self.users.get_mut(user_id) {
                        user.team_id = None;
                    }
                }
                self.teams.remove(&id);
                self.team_names.release(id, &team.name);
                debug!(team_id = %id, %error, "restore lost a race for a member");
                return Err(error.into());
            }
        }
        self.team_ids.observe(id.get());

        info!(team_id = %id, members = team.members.len(), "team restored");
        Ok(team)
    }

    /// Runs `f` with exclusive access to the team
    ///
    /// # Errors
    ///
    /// Returns `TeamNotFound`, `Busy` if the lock is not acquired within the
    /// configured bound, or whatever `f` returns.
    pub fn with_team<R>(
        &self,
        team_id: TeamId,
        f: impl FnOnce(&mut Team) -> Result<R>,
    ) -> Result<R> {
        let team = self
            .teams
            .get(&team_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::TeamNotFound(team_id))?;

        let Some(mut guard) = team.try_lock_for(self.lock_timeout) else {
            debug!(team_id = %team_id, "team lock timed out");
            return Err(crate::Error::Busy(Entity::Team(team_id)));
        };
        f(&mut guard)
    }

    /// Adds `user_id` to `team_id`
    ///
    /// `gate` runs under the team lock before anything changes and can veto
    /// the join; `commit` runs under the same lock after the member was
    /// added, so its observations are never interleaved with other
    /// operations on the team.
    ///
    /// # Errors
    ///
    /// Returns `TeamNotFound`, `UserNotFound`, `UserAlreadyAssigned`,
    /// `TeamFull`, `Busy`, or the gate's error.
    pub fn join_team<R>(
        &self,
        user_id: UserId,
        team_id: TeamId,
        gate: impl FnOnce(&Team) -> Result<()>,
        commit: impl FnOnce(&mut Team) -> R,
    ) -> Result<R> {
        self.with_team(team_id, |team| {
            gate(team)?;

            let mut user = self
                .users
                .get_mut(&user_id)
                .ok_or(Error::UserNotFound(user_id))?;
            if user.team_id.is_some() {
                return Err(Error::UserAlreadyAssigned(user_id).into());
            }
            if !team.has_free_seat() {
                return Err(Error::TeamFull(team_id).into());
            }

            team.members.insert(user_id);
            user.team_id = Some(team_id);
            drop(user);

            info!(
                user_id = %user_id,
                team_id = %team_id,
                player_count = team.player_count(),
                "user joined team"
            );
            Ok(commit(team))
        })
    }

    /// Removes `user_id` from their team
    ///
    /// The user's color is released through `colors` before the member is
    /// removed; both happen under the team lock, so other operations on the
    /// team observe either the complete leave or none of it.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound`, `UserNotInTeam`, `Busy`, or the gate's error.
    pub fn leave_team<R>(
        &self,
        user_id: UserId,
        colors: &ColorEngine,
        gate: impl FnOnce(&Team) -> Result<()>,
        commit: impl FnOnce(&mut Team) -> R,
    ) -> Result<R> {
        let team_id = self.team_of(user_id)?;
        self.with_team(team_id, |team| {
            if !team.has_member(user_id) {
                return Err(Error::UserNotInTeam(user_id).into());
            }
            gate(team)?;

            let released = colors.release(team, user_id);
            team.members.remove(&user_id);
            if let Some(mut user) = self.users.get_mut(&user_id) {
                user.team_id = None;
            }

            info!(
                user_id = %user_id,
                team_id = %team_id,
                released = ?released,
                "user left team"
            );
            Ok(commit(team))
        })
    }

    /// Ids of all teams in ascending order
    pub fn team_ids(&self) -> Vec<TeamId> {
        self.teams.iter().map(|entry| *entry.key()).sorted().collect()
    }

    /// Username of every user in `ids`, skipping unknown ids
    pub fn usernames<I: IntoIterator<Item = UserId>>(&self, ids: I) -> Vec<(UserId, String)> {
        ids.into_iter()
            .filter_map(|id| Some((id, self.users.get(&id)?.username.clone())))
            .collect()
    }
}
