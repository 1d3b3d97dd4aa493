//! Coordinator facade
//!
//! The [`Coordinator`] is the only entry point transports talk to. It checks
//! the session state before delegating to the registry, the color engine
//! and the arbiter, turns their results into response shapes, and publishes
//! the resulting events.
//!
//! Locks are always taken in the same order: team, then session, then user
//! records. A multi-step operation such as leaving a team (release the color,
//! then remove the member) runs under one team lock, so other operations on
//! that team see all of it or none of it.

use std::collections::BTreeMap;

use garde::Validate;
use itertools::Itertools;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::{
    AlarmMessage,
    arbiter::{Puzzle, PuzzleArbiter, Submission},
    broadcast::{Event, Publisher, Topic},
    colors::{AvailableColors, ColorEngine},
    config::{Config, InvalidConfig},
    constants,
    error::{Error, Result},
    ids::{PuzzleId, SessionId, TeamId, UserId},
    registry::{Capacity, Team, TeamRegistry, TeamSnapshot, User},
    responses::{
        AvailableTeam, ColorAssignmentResponse, FailureResponse, FinalPlayer, GameResult,
        GameSessionResponse, PlayerPoints, PuzzleAnswerResponse, TeamColorValidation,
        TeamPoints, TeamStatus, UserResponse,
    },
    scores::Scoreboard,
    session::{self, GameSession, SessionBook, SessionRecord, SessionStatus, epoch_millis},
};

/// A color request for a member of a team
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct AssignColorRequest {
    /// Member asking for a color
    #[garde(skip)]
    pub user_id: UserId,
    /// The member's team
    #[garde(skip)]
    pub team_id: TeamId,
    /// Color the member would like
    #[garde(length(chars, min = 1, max = constants::palette::MAX_COLOR_LENGTH))]
    #[serde(default)]
    pub preferred_color: Option<String>,
}

/// An answer to a puzzle
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct AnswerSubmission {
    /// Puzzle answered
    #[garde(skip)]
    pub puzzle_id: PuzzleId,
    /// Submitting user
    #[garde(skip)]
    pub user_id: UserId,
    /// The answer text
    #[garde(length(chars, max = constants::answer_text::MAX_LENGTH))]
    pub answer: String,
}

/// Requests a transport can decode and pass to [`Coordinator::handle`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum Request {
    /// Register a new user
    RegisterUser {
        /// Requested username
        username: String,
    },
    /// Look up a user
    GetUser {
        /// The user
        user_id: UserId,
    },
    /// Create an empty team
    CreateTeam {
        /// Team name, generated when absent
        #[serde(default)]
        name: Option<String>,
        /// Seat limit
        #[serde(default)]
        capacity: Capacity,
    },
    /// Look up a team
    GetTeam {
        /// The team
        team_id: TeamId,
    },
    /// List teams that can take another member
    ListAvailableTeams,
    /// Add a user to a team
    JoinTeam {
        /// Joining user
        user_id: UserId,
        /// Team to join
        team_id: TeamId,
    },
    /// Remove a user from their team
    LeaveTeam {
        /// Leaving user
        user_id: UserId,
    },
    /// Give a member a color
    AssignColor(AssignColorRequest),
    /// Remove duplicate colors from a team
    ResolveConflicts {
        /// The team
        team_id: TeamId,
    },
    /// Report duplicate colors of a team
    ValidateTeamColors {
        /// The team
        team_id: TeamId,
    },
    /// Report free and used colors of a team
    AvailableColors {
        /// The team
        team_id: TeamId,
    },
    /// Look up a session
    GetSession {
        /// The session
        session_id: SessionId,
    },
    /// Move a session from the lobby into its countdown
    StartCountdown {
        /// The session
        session_id: SessionId,
    },
    /// Start a session without waiting for the countdown
    StartGame {
        /// The session
        session_id: SessionId,
    },
    /// Finish an active session
    EndGame {
        /// The session
        session_id: SessionId,
    },
    /// Move a session to the given status
    Transition {
        /// The session
        session_id: SessionId,
        /// Requested status
        status: SessionStatus,
    },
    /// Answer a puzzle
    SubmitAnswer(AnswerSubmission),
    /// Balances of a team's members
    TeamPoints {
        /// The team
        team_id: TeamId,
    },
    /// Summary of a finished session
    GameResult {
        /// The session
        session_id: SessionId,
    },
}

/// Everything [`Coordinator::handle`] can answer with
#[derive(Debug, Clone, PartialEq, serde::Serialize, derive_more::From)]
pub enum Response {
    /// A user
    User(UserResponse),
    /// A team
    Team(AvailableTeam),
    /// Several teams
    Teams(Vec<AvailableTeam>),
    /// Outcome of a color operation, successful or not
    Color(ColorAssignmentResponse),
    /// Duplicate colors of a team
    ColorValidation(TeamColorValidation),
    /// Free and used colors of a team
    AvailableColors(AvailableColors),
    /// A session
    Session(GameSessionResponse),
    /// Outcome of an answer
    Answer(PuzzleAnswerResponse),
    /// Balances of a team
    Points(TeamPoints),
    /// Summary of a finished session
    GameResult(GameResult),
    /// A rejected request
    Failure(FailureResponse),
}

/// Coordinates teams, colors, answers and sessions
///
/// All methods take `&self`; the coordinator is meant to be shared between
/// request handlers, for example behind an `Arc`.
#[derive(Debug)]
pub struct Coordinator<P> {
    config: Config,
    registry: TeamRegistry,
    colors: ColorEngine,
    arbiter: PuzzleArbiter,
    sessions: SessionBook,
    publisher: P,
}

impl<P: Publisher> Coordinator<P> {
    /// Creates a coordinator publishing events through `publisher`
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`] if the configuration is out of bounds.
    pub fn new(config: Config, publisher: P) -> Result<Self, InvalidConfig> {
        let config = config.validated()?;
        Ok(Self {
            registry: TeamRegistry::new(config.default_max_players, config.lock_timeout),
            colors: ColorEngine::new(config.palette.clone()),
            arbiter: PuzzleArbiter::new(config.lock_timeout),
            sessions: SessionBook::new(config.lock_timeout),
            config,
            publisher,
        })
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The publisher events are sent through
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    fn publish(&self, topic: Topic, event: Event) {
        debug!(%topic, "publishing event");
        self.publisher.broadcast(&topic, &event);
    }

    fn user_view(user: &User, team: Option<&Team>) -> UserResponse {
        UserResponse {
            id: user.id,
            username: user.username.clone(),
            team_id: user.team_id,
            color: team
                .filter(|team| Some(team.id()) == user.team_id)
                .and_then(|team| team.color_of(user.id))
                .map(str::to_owned),
        }
    }

    fn session_status(&self, session_id: SessionId) -> Result<SessionStatus> {
        self.sessions.read(session_id, |session, _| Ok(session.status()))
    }

    fn team_view(&self, team: &Team) -> Result<AvailableTeam> {
        let members = team
            .members()
            .map(|user_id| {
                let user = self.registry.user(user_id).map_err(|_| {
                    Error::Corrupted(format!("team {} lists unknown user {user_id}", team.id()))
                })?;
                Ok(Self::user_view(&user, Some(team)))
            })
            .collect::<Result<Vec<_>>>()?;

        let game_status = team
            .game_session_id()
            .map(|session_id| self.session_status(session_id))
            .transpose()?;

        let status = match game_status {
            Some(SessionStatus::Countdown | SessionStatus::Active) => TeamStatus::Playing,
            _ if team.has_free_seat() => TeamStatus::Open,
            _ => TeamStatus::Full,
        };

        Ok(AvailableTeam {
            id: team.id(),
            name: team.name().to_owned(),
            player_count: team.player_count(),
            members,
            max_players: team.max_players(),
            status,
            game_session_id: team.game_session_id(),
            game_status,
        })
    }

    fn session_view(&self, session: &GameSession) -> GameSessionResponse {
        GameSessionResponse {
            id: session.id(),
            team_id: session.team_id(),
            status: session.status(),
            current_puzzle_id: (session.status() == SessionStatus::Active)
                .then(|| self.arbiter.current(session.puzzles()))
                .flatten(),
            created_at: session.created_at(),
            started_at: session.started_at(),
            ended_at: session.ended_at(),
            survival_time_seconds: session.survival_time_seconds(),
        }
    }

    fn points_view(
        &self,
        team: &Team,
        session_id: Option<SessionId>,
        scores: &Scoreboard,
    ) -> TeamPoints {
        let standings = scores.standings();
        let balances = if standings.is_empty() {
            team.members().map(|user_id| (user_id, 0)).collect_vec()
        } else {
            standings
        };
        let usernames: BTreeMap<_, _> = self
            .registry
            .usernames(balances.iter().map(|(user_id, _)| *user_id))
            .into_iter()
            .collect();

        TeamPoints {
            team_id: team.id(),
            session_id,
            players: balances
                .into_iter()
                .map(|(user_id, points)| PlayerPoints {
                    user_id,
                    username: usernames.get(&user_id).cloned().unwrap_or_default(),
                    points,
                    eliminated: scores.is_eliminated(user_id),
                })
                .collect(),
        }
    }

    /// Rejects membership and color changes unless the team's session is in the lobby
    fn lobby_gate(&self, team: &Team) -> Result<()> {
        match team.game_session_id() {
            None => Ok(()),
            Some(session_id) => self
                .sessions
                .read(session_id, |session, _| Ok(session.ensure_lobby()?)),
        }
    }

    fn announce_session(&self, response: &GameSessionResponse) {
        let event = Event::SessionStatusChanged(response.clone());
        self.publish(Topic::Team(response.team_id), event.clone());
        self.publish(Topic::Session(response.id), event);
    }

    /// Registers a user
    ///
    /// # Errors
    ///
    /// Returns a name error for an invalid or taken username.
    pub fn register_user(&self, username: &str) -> Result<UserResponse> {
        let user = self.registry.register_user(username)?;
        Ok(Self::user_view(&user, None))
    }

    /// Looks up a user together with their color
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `Busy`.
    pub fn get_user(&self, user_id: UserId) -> Result<UserResponse> {
        let user = self.registry.user(user_id)?;
        match user.team_id {
            None => Ok(Self::user_view(&user, None)),
            Some(team_id) => self
                .registry
                .with_team(team_id, |team| Ok(Self::user_view(&user, Some(team)))),
        }
    }

    /// Creates an empty team
    ///
    /// # Errors
    ///
    /// Returns a name error or `InvalidCapacity`.
    pub fn create_team(&self, name: Option<&str>, capacity: Capacity) -> Result<AvailableTeam> {
        let team = self
            .registry
            .create_team(name, capacity, &self.config.team_names)?;
        self.team_view(&team)
    }

    /// Re-imports a team from an external store, duplicate colors included
    ///
    /// # Errors
    ///
    /// Any error of [`TeamRegistry::restore_team`].
    pub fn restore_team(&self, snapshot: TeamSnapshot) -> Result<AvailableTeam> {
        let team = self.registry.restore_team(snapshot)?;
        let conflicts = self.colors.conflicts(&team);
        if !conflicts.is_empty() {
            warn!(
                team_id = %team.id(),
                conflicts = conflicts.len(),
                "restored team holds duplicate colors"
            );
        }
        self.team_view(&team)
    }

    /// Looks up a team
    ///
    /// # Errors
    ///
    /// Returns `TeamNotFound` or `Busy`.
    pub fn get_team(&self, team_id: TeamId) -> Result<AvailableTeam> {
        self.registry.with_team(team_id, |team| self.team_view(team))
    }

    /// Teams that can take another member, ordered by id
    ///
    /// # Errors
    ///
    /// Returns `Busy` if a team stays locked for too long.
    pub fn list_available_teams(&self) -> Result<Vec<AvailableTeam>> {
        let mut available = Vec::new();
        for team_id in self.registry.team_ids() {
            let view = self.registry.with_team(team_id, |team| self.team_view(team))?;
            let in_lobby = matches!(view.game_status, None | Some(SessionStatus::Lobby));
            if view.status == TeamStatus::Open && in_lobby {
                available.push(view);
            }
        }
        Ok(available)
    }

    /// Adds a user to a team
    ///
    /// When configured to, the new member also receives the first free
    /// color; running out of colors does not fail the join.
    ///
    /// # Errors
    ///
    /// Returns `TeamNotFound`, `UserNotFound`, `UserAlreadyAssigned`,
    /// `TeamFull`, `Locked`, `Finished` or `Busy`.
    pub fn join_team(&self, user_id: UserId, team_id: TeamId) -> Result<AvailableTeam> {
        self.registry.join_team(
            user_id,
            team_id,
            |team| self.lobby_gate(team),
            |team| -> Result<AvailableTeam> {
                if self.config.assign_color_on_join {
                    match self.colors.assign(team, user_id, None) {
                        Ok(assignment) => self.publish(
                            Topic::Team(team_id),
                            Event::ColorReassigned(ColorAssignmentResponse {
                                success: true,
                                message: "Color assigned successfully".to_owned(),
                                reassignments: Some(BTreeMap::from([(
                                    user_id.to_string(),
                                    assignment.color,
                                )])),
                                conflicts: None,
                            }),
                        ),
                        Err(error) => {
                            warn!(user_id = %user_id, team_id = %team_id, %error, "joined without a color");
                        }
                    }
                }
                let view = self.team_view(team)?;
                self.publish(Topic::Team(team_id), Event::MembershipChanged(view.clone()));
                Ok(view)
            },
        )?
    }

    /// Removes a user from their team, releasing their color
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound`, `UserNotInTeam`, `Locked`, `Finished` or `Busy`.
    pub fn leave_team(&self, user_id: UserId) -> Result<UserResponse> {
        self.registry.leave_team(
            user_id,
            &self.colors,
            |team| self.lobby_gate(team),
            |team| -> Result<()> {
                let view = self.team_view(team)?;
                self.publish(Topic::Team(team.id()), Event::MembershipChanged(view));
                Ok(())
            },
        )??;
        let user = self.registry.user(user_id)?;
        Ok(Self::user_view(&user, None))
    }

    /// Gives a member a color no other member of the team holds
    ///
    /// # Errors
    ///
    /// Returns `Invalid`, `TeamNotFound`, `Locked`, `Finished`, `NotAMember`,
    /// `UnknownColor`, `DuplicateColors`, `PaletteExhausted` or `Busy`.
    pub fn assign_color(&self, request: &AssignColorRequest) -> Result<ColorAssignmentResponse> {
        request.validate()?;
        let AssignColorRequest {
            user_id,
            team_id,
            preferred_color,
        } = request;

        self.registry.with_team(*team_id, |team| {
            self.lobby_gate(team)?;
            let assignment = self
                .colors
                .assign(team, *user_id, preferred_color.as_deref())?;

            let message = match preferred_color {
                Some(preferred) if assignment.preference_denied => {
                    format!("Preferred color {preferred} is taken, assigned {}", assignment.color)
                }
                _ if !assignment.changed => "User already has color assigned".to_owned(),
                _ => "Color assigned successfully".to_owned(),
            };
            let response = ColorAssignmentResponse {
                success: true,
                message,
                reassignments: Some(BTreeMap::from([(user_id.to_string(), assignment.color)])),
                conflicts: None,
            };

            if assignment.changed {
                self.publish(
                    Topic::Team(*team_id),
                    Event::ColorReassigned(response.clone()),
                );
            }
            Ok(response)
        })
    }

    /// Removes every duplicate color from a team
    ///
    /// Allowed in every session status except `finished`. Calling it again
    /// right away reports no reassignments.
    ///
    /// # Errors
    ///
    /// Returns `TeamNotFound`, `Finished` or `Busy`.
    pub fn resolve_conflicts(&self, team_id: TeamId) -> Result<ColorAssignmentResponse> {
        self.registry.with_team(team_id, |team| {
            if let Some(session_id) = team.game_session_id() {
                self.sessions
                    .read(session_id, |session, _| Ok(session.ensure_not_finished()?))?;
            }

            let conflicts = self.colors.conflicts(team);
            let resolution = self.colors.resolve_conflicts(team);

            let mut message = if resolution.is_empty() {
                "No color conflicts found".to_owned()
            } else {
                format!("Resolved {} color conflicts", conflicts.len())
            };
            if !resolution.uncolored.is_empty() {
                message.push_str(&format!(
                    "; palette exhausted, cleared colors of users {}",
                    resolution.uncolored.iter().join(", ")
                ));
            }

            let response = ColorAssignmentResponse {
                success: true,
                message,
                reassignments: Some(
                    resolution
                        .reassignments
                        .iter()
                        .map(|(user_id, color)| (user_id.to_string(), color.clone()))
                        .collect(),
                ),
                conflicts: Some(conflicts),
            };

            if !resolution.is_empty() {
                self.publish(Topic::Team(team_id), Event::ColorReassigned(response.clone()));
            }
            Ok(response)
        })
    }

    /// Reports duplicate colors of a team
    ///
    /// # Errors
    ///
    /// Returns `TeamNotFound` or `Busy`.
    pub fn validate_team_colors(&self, team_id: TeamId) -> Result<TeamColorValidation> {
        self.registry.with_team(team_id, |team| {
            let conflicts = self.colors.conflicts(team);
            Ok(TeamColorValidation {
                is_valid: conflicts.is_empty(),
                conflicts,
            })
        })
    }

    /// Reports free and used colors of a team
    ///
    /// # Errors
    ///
    /// Returns `TeamNotFound` or `Busy`.
    pub fn available_colors(&self, team_id: TeamId) -> Result<AvailableColors> {
        self.registry
            .with_team(team_id, |team| Ok(self.colors.available(team)))
    }

    /// Creates a session in the lobby for a team
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for too many puzzles, `TeamNotFound`,
    /// `AlreadyRunning` while the team has a session that is not finished,
    /// `DuplicatePuzzle`, or `Busy`.
    pub fn create_session(
        &self,
        team_id: TeamId,
        puzzles: Vec<Puzzle>,
    ) -> Result<GameSessionResponse> {
        if puzzles.len() > constants::session::MAX_PUZZLE_COUNT {
            return Err(Error::Invalid(format!(
                "a session holds at most {} puzzles",
                constants::session::MAX_PUZZLE_COUNT
            )));
        }

        self.registry.with_team(team_id, |team| {
            if let Some(existing) = team.game_session_id() {
                let (status, previous) = self.sessions.read(existing, |session, _| {
                    Ok((session.status(), session.puzzles().to_vec()))
                })?;
                if status != SessionStatus::Finished {
                    return Err(session::Error::AlreadyRunning(team_id).into());
                }
                self.arbiter.retire(existing, &previous);
            }

            let session_id = self.sessions.next_id();
            self.arbiter
                .register(session_id, &puzzles, self.config.points_per_puzzle)?;
            let session = self.sessions.insert(
                session_id,
                team_id,
                puzzles.iter().map(|puzzle| puzzle.id).collect(),
            );
            team.game_session_id = Some(session_id);

            info!(session_id = %session_id, team_id = %team_id, puzzles = puzzles.len(), "session created");
            let response = self.session_view(&session);
            self.announce_session(&response);
            Ok(response)
        })
    }

    /// Looks up a session
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Busy`.
    pub fn get_session(&self, session_id: SessionId) -> Result<GameSessionResponse> {
        self.sessions
            .read(session_id, |session, _| Ok(self.session_view(session)))
    }

    fn apply_transition<S: FnMut(AlarmMessage, web_time::Duration)>(
        &self,
        team: &Team,
        session: &mut GameSession,
        record: &SessionRecord,
        target: SessionStatus,
        schedule_message: &mut S,
    ) -> Result<GameSessionResponse> {
        session.advance(target, epoch_millis())?;

        match target {
            SessionStatus::Countdown => {
                schedule_message(
                    AlarmMessage::CountdownElapsed(session.id()),
                    self.config.countdown,
                );
            }
            SessionStatus::Active => {
                *record.scores() = Scoreboard::seed(team.members(), self.config.starting_points);
                schedule_message(
                    AlarmMessage::PointDecay(session.id()),
                    self.config.decay_interval,
                );
            }
            SessionStatus::Lobby | SessionStatus::Finished => {}
        }

        let response = self.session_view(session);
        self.announce_session(&response);
        Ok(response)
    }

    /// Runs `f` under the lock of the session's team and then the session itself
    fn with_session_of_team<R>(
        &self,
        session_id: SessionId,
        f: impl FnOnce(&Team, &mut GameSession, &SessionRecord) -> Result<R>,
    ) -> Result<R> {
        let team_id = self
            .sessions
            .read(session_id, |session, _| Ok(session.team_id()))?;
        self.registry.with_team(team_id, |team| {
            self.sessions
                .write(session_id, |session, record| f(team, session, record))
        })
    }

    /// Moves a session one step forward
    ///
    /// Entering `countdown` schedules [`AlarmMessage::CountdownElapsed`];
    /// entering `active` gives every member the starting balance and
    /// schedules the first [`AlarmMessage::PointDecay`].
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidTransition` or `Busy`.
    pub fn transition<S: FnMut(AlarmMessage, web_time::Duration)>(
        &self,
        session_id: SessionId,
        target: SessionStatus,
        mut schedule_message: S,
    ) -> Result<GameSessionResponse> {
        self.with_session_of_team(session_id, |team, session, record| {
            self.apply_transition(team, session, record, target, &mut schedule_message)
        })
    }

    /// Moves a session from the lobby into its countdown
    ///
    /// # Errors
    ///
    /// See [`Coordinator::transition`].
    pub fn start_countdown<S: FnMut(AlarmMessage, web_time::Duration)>(
        &self,
        session_id: SessionId,
        schedule_message: S,
    ) -> Result<GameSessionResponse> {
        self.transition(session_id, SessionStatus::Countdown, schedule_message)
    }

    /// Starts a session without waiting for its countdown
    ///
    /// # Errors
    ///
    /// See [`Coordinator::transition`].
    pub fn start_game<S: FnMut(AlarmMessage, web_time::Duration)>(
        &self,
        session_id: SessionId,
        schedule_message: S,
    ) -> Result<GameSessionResponse> {
        self.transition(session_id, SessionStatus::Active, schedule_message)
    }

    /// Finishes an active session
    ///
    /// # Errors
    ///
    /// See [`Coordinator::transition`].
    pub fn end_game(&self, session_id: SessionId) -> Result<GameSessionResponse> {
        self.transition(session_id, SessionStatus::Finished, |_, _| {})
    }

    /// Handles an alarm scheduled by an earlier operation
    ///
    /// Alarms that no longer apply, such as a countdown alarm for a session
    /// that was already started, are ignored.
    ///
    /// # Returns
    ///
    /// The session after a status change the alarm caused
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Busy`.
    pub fn receive_alarm<S: FnMut(AlarmMessage, web_time::Duration)>(
        &self,
        message: AlarmMessage,
        mut schedule_message: S,
    ) -> Result<Option<GameSessionResponse>> {
        match message {
            AlarmMessage::CountdownElapsed(session_id) => {
                self.with_session_of_team(session_id, |team, session, record| {
                    if session.status() != SessionStatus::Countdown {
                        debug!(session_id = %session_id, "stale countdown alarm");
                        return Ok(None);
                    }
                    self.apply_transition(
                        team,
                        session,
                        record,
                        SessionStatus::Active,
                        &mut schedule_message,
                    )
                    .map(Some)
                })
            }
            AlarmMessage::PointDecay(session_id) => {
                self.with_session_of_team(session_id, |team, session, record| {
                    if session.status() != SessionStatus::Active {
                        debug!(session_id = %session_id, "stale decay alarm");
                        return Ok(None);
                    }

                    let (points, all_eliminated) = {
                        let mut scores = record.scores();
                        for user_id in scores.decay(self.config.points_lost_per_decay) {
                            info!(session_id = %session_id, user_id = %user_id, "player eliminated");
                        }
                        (
                            self.points_view(team, Some(session_id), &scores),
                            scores.all_eliminated(),
                        )
                    };
                    self.publish(Topic::Session(session_id), Event::PointsChanged(points));

                    if all_eliminated {
                        info!(session_id = %session_id, "every player eliminated");
                        return self
                            .apply_transition(
                                team,
                                session,
                                record,
                                SessionStatus::Finished,
                                &mut schedule_message,
                            )
                            .map(Some);
                    }

                    schedule_message(
                        AlarmMessage::PointDecay(session_id),
                        self.config.decay_interval,
                    );
                    Ok(None)
                })
            }
        }
    }

    /// Judges an answer
    ///
    /// The first correct answer to a puzzle wins its points; every later
    /// submission learns whether its own answer was correct but earns
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `Invalid`, `PuzzleNotFound`, `UserNotFound`, `NotActive`,
    /// `NotPlaying`, `PlayerEliminated` or `Busy`.
    pub fn submit_answer(&self, submission: &AnswerSubmission) -> Result<PuzzleAnswerResponse> {
        submission.validate()?;
        let AnswerSubmission {
            puzzle_id,
            user_id,
            answer,
        } = submission;
        let session_id = self.arbiter.session_of(*puzzle_id)?;

        self.sessions.read(session_id, |session, record| {
            session.ensure_active()?;
            let user = self.registry.user(*user_id)?;
            if user.team_id != Some(session.team_id()) {
                return Err(session::Error::NotPlaying {
                    user: *user_id,
                    session: session_id,
                }
                .into());
            }
            if record.scores().is_eliminated(*user_id) {
                return Err(session::Error::PlayerEliminated(*user_id).into());
            }

            let verdict = self.arbiter.submit(
                Submission {
                    puzzle_id: *puzzle_id,
                    user_id: *user_id,
                    answer,
                },
                epoch_millis,
            )?;
            if let Some(award) = verdict.award {
                record.scores().credit(*puzzle_id, award.user_id, award.points);
            }

            let response = PuzzleAnswerResponse {
                correct: verdict.correct,
                awarded_to_user_id: verdict.award.map(|award| award.user_id),
                points_awarded: verdict.award.map_or(0, |award| award.points),
                next_puzzle_id: verdict.next_puzzle.as_ref().map(|next| next.id),
                next_puzzle: verdict.next_puzzle,
            };
            if verdict.award.is_some() {
                self.publish(
                    Topic::Session(session_id),
                    Event::PuzzleResolved(response.clone()),
                );
            }
            Ok(response)
        })
    }

    /// Balances of a team's members in its most recent session
    ///
    /// Before a session becomes active every member is listed with zero.
    ///
    /// # Errors
    ///
    /// Returns `TeamNotFound` or `Busy`.
    pub fn team_points(&self, team_id: TeamId) -> Result<TeamPoints> {
        self.registry.with_team(team_id, |team| match team.game_session_id() {
            None => Ok(self.points_view(team, None, &Scoreboard::default())),
            Some(session_id) => self.sessions.read(session_id, |_, record| {
                Ok(self.points_view(team, Some(session_id), &record.scores()))
            }),
        })
    }

    /// Summary of a finished session
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `NotFinished` or `Busy`.
    pub fn game_result(&self, session_id: SessionId) -> Result<GameResult> {
        self.sessions.read(session_id, |session, record| {
            if session.status() != SessionStatus::Finished {
                return Err(session::Error::NotFinished(session_id).into());
            }

            let scores = record.scores();
            let solved = scores.solved_counts();
            let standings = scores.standings();
            let usernames: BTreeMap<_, _> = self
                .registry
                .usernames(standings.iter().map(|(user_id, _)| *user_id))
                .into_iter()
                .collect();

            Ok(GameResult {
                session_id,
                team_id: session.team_id(),
                survival_time_seconds: session.survival_time_seconds(),
                puzzles_solved: scores.solved().len(),
                players: standings
                    .into_iter()
                    .map(|(user_id, points)| FinalPlayer {
                        user_id,
                        username: usernames.get(&user_id).cloned().unwrap_or_default(),
                        points,
                        puzzles_solved: solved.get(&user_id).copied().unwrap_or_default(),
                    })
                    .collect(),
            })
        })
    }

    fn reject(error: &Error, color_operation: bool) -> Response {
        if error.is_fatal() {
            error!(%error, "unrecoverable coordinator failure");
        } else {
            warn!(kind = ?error.kind(), %error, "request rejected");
        }

        if color_operation {
            ColorAssignmentResponse::failure(error.to_string()).into()
        } else {
            FailureResponse::from(error).into()
        }
    }

    /// Handles a decoded request, always producing a response
    ///
    /// Failures become [`Response::Failure`], except for color operations
    /// which report them as an unsuccessful [`ColorAssignmentResponse`].
    pub fn handle<S: FnMut(AlarmMessage, web_time::Duration)>(
        &self,
        request: Request,
        schedule_message: S,
    ) -> Response {
        let color_operation = matches!(
            request,
            Request::AssignColor(_) | Request::ResolveConflicts { .. }
        );

        let outcome = match request {
            Request::RegisterUser { username } => self.register_user(&username).map(Response::from),
            Request::GetUser { user_id } => self.get_user(user_id).map(Response::from),
            Request::CreateTeam { name, capacity } => self
                .create_team(name.as_deref(), capacity)
                .map(Response::from),
            Request::GetTeam { team_id } => self.get_team(team_id).map(Response::from),
            Request::ListAvailableTeams => self.list_available_teams().map(Response::from),
            Request::JoinTeam { user_id, team_id } => {
                self.join_team(user_id, team_id).map(Response::from)
            }
            Request::LeaveTeam { user_id } => self.leave_team(user_id).map(Response::from),
            Request::AssignColor(request) => self.assign_color(&request).map(Response::from),
            Request::ResolveConflicts { team_id } => {
                self.resolve_conflicts(team_id).map(Response::from)
            }
            Request::ValidateTeamColors { team_id } => {
                self.validate_team_colors(team_id).map(Response::from)
            }
            Request::AvailableColors { team_id } => {
                self.available_colors(team_id).map(Response::from)
            }
            Request::GetSession { session_id } => self.get_session(session_id).map(Response::from),
            Request::StartCountdown { session_id } => self
                .start_countdown(session_id, schedule_message)
                .map(Response::from),
            Request::StartGame { session_id } => self
                .start_game(session_id, schedule_message)
                .map(Response::from),
            Request::EndGame { session_id } => self.end_game(session_id).map(Response::from),
            Request::Transition { session_id, status } => self
                .transition(session_id, status, schedule_message)
                .map(Response::from),
            Request::SubmitAnswer(submission) => {
                self.submit_answer(&submission).map(Response::from)
            }
            Request::TeamPoints { team_id } => self.team_points(team_id).map(Response::from),
            Request::GameResult { session_id } => self.game_result(session_id).map(Response::from),
        };

        outcome.unwrap_or_else(|error| Self::reject(&error, color_operation))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::{
        arbiter, colors, registry,
        registry::MemberSnapshot,
    };

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<(Topic, Event)>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<(Topic, Event)> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl Publisher for Recorder {
        fn broadcast(&self, topic: &Topic, event: &Event) {
            self.events.lock().push((*topic, event.clone()));
        }
    }

    fn coordinator() -> Coordinator<Recorder> {
        Coordinator::new(Config::default(), Recorder::default()).unwrap()
    }

    fn ignore(_: AlarmMessage, _: web_time::Duration) {}

    fn team_with_players(
        coordinator: &Coordinator<Recorder>,
        capacity: Capacity,
        players: &[&str],
    ) -> (TeamId, Vec<UserId>) {
        let team = coordinator.create_team(Some("Owls"), capacity).unwrap();
        let users = players
            .iter()
            .map(|name| {
                let user = coordinator.register_user(name).unwrap();
                coordinator.join_team(user.id, team.id).unwrap();
                user.id
            })
            .collect();
        (team.id, users)
    }

    fn assign(
        coordinator: &Coordinator<Recorder>,
        team_id: TeamId,
        user_id: UserId,
        preferred: Option<&str>,
    ) -> Result<ColorAssignmentResponse> {
        coordinator.assign_color(&AssignColorRequest {
            user_id,
            team_id,
            preferred_color: preferred.map(str::to_owned),
        })
    }

    fn active_session(
        coordinator: &Coordinator<Recorder>,
        team_id: TeamId,
        puzzles: Vec<Puzzle>,
    ) -> SessionId {
        let session = coordinator.create_session(team_id, puzzles).unwrap();
        coordinator.start_countdown(session.id, ignore).unwrap();
        coordinator.start_game(session.id, ignore).unwrap();
        session.id
    }

    fn answer(puzzle: u64, user_id: UserId, text: &str) -> AnswerSubmission {
        AnswerSubmission {
            puzzle_id: PuzzleId::new(puzzle),
            user_id,
            answer: text.to_owned(),
        }
    }

    #[test]
    fn test_team_of_two_scenario() {
        let coordinator = coordinator();
        let team = coordinator
            .create_team(Some("Owls"), Capacity::Bounded(2))
            .unwrap();
        let users: Vec<_> = ["one", "two", "three"]
            .iter()
            .map(|name| coordinator.register_user(name).unwrap().id)
            .collect();

        assert_eq!(coordinator.join_team(users[0], team.id).unwrap().player_count, 1);
        let full = coordinator.join_team(users[1], team.id).unwrap();
        assert_eq!(full.player_count, 2);
        assert_eq!(full.status, TeamStatus::Full);
        assert_eq!(
            coordinator.join_team(users[2], team.id),
            Err(registry::Error::TeamFull(team.id).into())
        );

        let first = assign(&coordinator, team.id, users[0], None).unwrap();
        assert_eq!(
            first.reassignments.unwrap().get(&users[0].to_string()),
            Some(&"red".to_owned())
        );

        let second = assign(&coordinator, team.id, users[1], Some("red")).unwrap();
        assert!(second.success);
        assert_eq!(
            second.reassignments.unwrap().get(&users[1].to_string()),
            Some(&"blue".to_owned())
        );
    }

    #[test]
    fn test_membership_events() {
        let coordinator = coordinator();
        let (team_id, users) = team_with_players(&coordinator, Capacity::Default, &["a", "b"]);
        let events = coordinator.publisher.take();

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|(topic, event)| {
            *topic == Topic::Team(team_id) && matches!(event, Event::MembershipChanged(_))
        }));

        coordinator.leave_team(users[0]).unwrap();
        let events = coordinator.publisher.take();
        match events.as_slice() {
            [(_, Event::MembershipChanged(team))] => {
                assert_eq!(team.player_count, 1);
                assert_eq!(team.members[0].id, users[1]);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_leave_releases_color_for_others() {
        let coordinator = coordinator();
        let (team_id, users) = team_with_players(&coordinator, Capacity::Default, &["a", "b"]);

        assign(&coordinator, team_id, users[0], Some("red")).unwrap();
        let left = coordinator.leave_team(users[0]).unwrap();
        assert_eq!(left.team_id, None);
        assert_eq!(left.color, None);

        let taken = assign(&coordinator, team_id, users[1], Some("red")).unwrap();
        assert_eq!(taken.message, "Color assigned successfully");
        assert_eq!(coordinator.get_user(users[1]).unwrap().color.as_deref(), Some("red"));
    }

    #[test]
    fn test_assign_keeps_existing_color() {
        let coordinator = coordinator();
        let (team_id, users) = team_with_players(&coordinator, Capacity::Default, &["a"]);

        assign(&coordinator, team_id, users[0], Some("green")).unwrap();
        coordinator.publisher.take();

        let again = assign(&coordinator, team_id, users[0], None).unwrap();
        assert_eq!(again.message, "User already has color assigned");
        assert!(coordinator.publisher.take().is_empty());
    }

    #[test]
    fn test_color_failures_through_handle() {
        let coordinator = coordinator();
        let (team_id, users) = team_with_players(&coordinator, Capacity::Default, &["a"]);

        let response = coordinator.handle(
            Request::AssignColor(AssignColorRequest {
                user_id: users[0],
                team_id,
                preferred_color: Some("purple".to_owned()),
            }),
            ignore,
        );

        assert_eq!(
            response,
            Response::Color(ColorAssignmentResponse::failure(
                "color purple is not part of the palette"
            ))
        );
    }

    #[test]
    fn test_palette_exhausted() {
        let config = Config {
            palette: vec!["red".to_owned()],
            ..Config::default()
        };
        let coordinator = Coordinator::new(config, Recorder::default()).unwrap();
        let (team_id, users) = team_with_players(&coordinator, Capacity::Default, &["a", "b"]);

        assign(&coordinator, team_id, users[0], None).unwrap();
        assert_eq!(
            assign(&coordinator, team_id, users[1], None),
            Err(colors::Error::PaletteExhausted(team_id).into())
        );
    }

    #[test]
    fn test_auto_color_on_join() {
        let config = Config {
            assign_color_on_join: true,
            ..Config::default()
        };
        let coordinator = Coordinator::new(config, Recorder::default()).unwrap();
        let (_, users) = team_with_players(&coordinator, Capacity::Default, &["a", "b"]);

        assert_eq!(coordinator.get_user(users[0]).unwrap().color.as_deref(), Some("red"));
        assert_eq!(coordinator.get_user(users[1]).unwrap().color.as_deref(), Some("blue"));
    }

    #[test]
    fn test_restored_duplicates_must_be_resolved() {
        let coordinator = coordinator();
        let users: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| coordinator.register_user(name).unwrap().id)
            .collect();
        let team = coordinator
            .restore_team(TeamSnapshot {
                id: TeamId::new(5),
                name: "Restored".to_owned(),
                max_players: Some(4),
                members: users
                    .iter()
                    .map(|user_id| MemberSnapshot {
                        user_id: *user_id,
                        color: Some("red".to_owned()),
                    })
                    .collect(),
            })
            .unwrap();

        let validation = coordinator.validate_team_colors(team.id).unwrap();
        assert!(!validation.is_valid);
        assert_eq!(validation.conflicts[0].count, 3);

        assert_eq!(
            assign(&coordinator, team.id, users[0], None),
            Err(colors::Error::DuplicateColors(team.id).into())
        );

        let resolved = coordinator.resolve_conflicts(team.id).unwrap();
        assert_eq!(resolved.reassignments.as_ref().map(BTreeMap::len), Some(2));
        assert!(coordinator.validate_team_colors(team.id).unwrap().is_valid);

        let again = coordinator.resolve_conflicts(team.id).unwrap();
        assert_eq!(again.reassignments, Some(BTreeMap::new()));
        assert_eq!(again.message, "No color conflicts found");

        let colors = coordinator.available_colors(team.id).unwrap();
        assert_eq!(colors.available_colors, vec!["green".to_owned()]);
    }

    #[test]
    fn test_join_rejected_during_countdown() {
        let coordinator = coordinator();
        let (team_id, _) = team_with_players(&coordinator, Capacity::Default, &["a"]);
        let late = coordinator.register_user("late").unwrap();

        let session = coordinator.create_session(team_id, Vec::new()).unwrap();
        coordinator.start_countdown(session.id, ignore).unwrap();

        assert_eq!(
            coordinator.join_team(late.id, team_id),
            Err(session::Error::Locked(session.id).into())
        );
        assert!(coordinator.list_available_teams().unwrap().is_empty());
    }

    #[test]
    fn test_countdown_alarm_starts_game() {
        let coordinator = coordinator();
        let (team_id, _) = team_with_players(&coordinator, Capacity::Default, &["a"]);
        let session = coordinator
            .create_session(team_id, vec![Puzzle::exact(PuzzleId::new(1), "x")])
            .unwrap();

        let mut alarms = Vec::new();
        coordinator
            .start_countdown(session.id, |alarm, delay| alarms.push((alarm, delay)))
            .unwrap();
        assert_eq!(
            alarms,
            vec![(AlarmMessage::CountdownElapsed(session.id), Duration::from_secs(5))]
        );

        let started = coordinator
            .receive_alarm(alarms[0].0, |alarm, delay| alarms.push((alarm, delay)))
            .unwrap()
            .unwrap();
        assert_eq!(started.status, SessionStatus::Active);
        assert_eq!(started.current_puzzle_id, Some(PuzzleId::new(1)));
        assert!(started.started_at.is_some());
        assert_eq!(alarms[1].0, AlarmMessage::PointDecay(session.id));

        let stale = coordinator
            .receive_alarm(AlarmMessage::CountdownElapsed(session.id), ignore)
            .unwrap();
        assert_eq!(stale, None);
    }

    #[test]
    fn test_session_events_reach_team_and_session_topics() {
        let coordinator = coordinator();
        let (team_id, _) = team_with_players(&coordinator, Capacity::Default, &["a"]);
        coordinator.publisher.take();

        let session = coordinator.create_session(team_id, Vec::new()).unwrap();
        let topics: Vec<_> = coordinator
            .publisher
            .take()
            .into_iter()
            .map(|(topic, _)| topic)
            .collect();

        assert_eq!(topics, vec![Topic::Team(team_id), Topic::Session(session.id)]);
    }

    #[test]
    fn test_second_session_rejected_until_finished() {
        let coordinator = coordinator();
        let (team_id, _) = team_with_players(&coordinator, Capacity::Default, &["a"]);

        let first = active_session(&coordinator, team_id, Vec::new());
        assert_eq!(
            coordinator.create_session(team_id, Vec::new()),
            Err(session::Error::AlreadyRunning(team_id).into())
        );

        coordinator.end_game(first).unwrap();
        let second = coordinator.create_session(team_id, Vec::new()).unwrap();
        assert_eq!(second.status, SessionStatus::Lobby);
    }

    #[test]
    fn test_repeated_puzzle_id_leaves_team_usable() {
        let coordinator = coordinator();
        let (team_id, _) = team_with_players(&coordinator, Capacity::Default, &["a"]);

        assert_eq!(
            coordinator.create_session(
                team_id,
                vec![
                    Puzzle::exact(PuzzleId::new(7), "a"),
                    Puzzle::exact(PuzzleId::new(7), "b"),
                ],
            ),
            Err(arbiter::Error::DuplicatePuzzle(PuzzleId::new(7)).into())
        );

        assert_eq!(coordinator.get_team(team_id).unwrap().game_session_id, None);
        let session = coordinator
            .create_session(team_id, vec![Puzzle::exact(PuzzleId::new(7), "a")])
            .unwrap();
        assert_eq!(session.status, SessionStatus::Lobby);
    }

    #[test]
    fn test_next_session_reuses_puzzle_ids_of_finished_one() {
        let coordinator = coordinator();
        let (team_id, users) = team_with_players(&coordinator, Capacity::Default, &["a"]);
        let first = active_session(
            &coordinator,
            team_id,
            vec![Puzzle::exact(PuzzleId::new(42), "blue")],
        );
        coordinator.submit_answer(&answer(42, users[0], "blue")).unwrap();
        coordinator.end_game(first).unwrap();

        let second = active_session(
            &coordinator,
            team_id,
            vec![Puzzle::exact(PuzzleId::new(42), "green")],
        );

        let won = coordinator.submit_answer(&answer(42, users[0], "green")).unwrap();
        assert_eq!(won.awarded_to_user_id, Some(users[0]));
        assert_eq!(coordinator.game_result(first).unwrap().puzzles_solved, 1);
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_transition() {
        let coordinator = coordinator();
        let (team_id, _) = team_with_players(&coordinator, Capacity::Default, &["a"]);
        let session = coordinator.create_session(team_id, Vec::new()).unwrap();

        assert_eq!(
            coordinator.end_game(session.id),
            Err(session::Error::InvalidTransition {
                from: SessionStatus::Lobby,
                to: SessionStatus::Finished,
            }
            .into())
        );
    }

    #[test]
    fn test_answer_scenario() {
        let coordinator = coordinator();
        let (team_id, users) = team_with_players(&coordinator, Capacity::Default, &["a", "b"]);
        let session_id = active_session(
            &coordinator,
            team_id,
            vec![
                Puzzle::exact(PuzzleId::new(42), "blue").with_points(10),
                Puzzle::exact(PuzzleId::new(43), "green"),
            ],
        );
        coordinator.publisher.take();

        let won = coordinator.submit_answer(&answer(42, users[0], "blue")).unwrap();
        assert!(won.correct);
        assert_eq!(won.awarded_to_user_id, Some(users[0]));
        assert_eq!(won.points_awarded, 10);
        assert_eq!(won.next_puzzle_id, Some(PuzzleId::new(43)));

        let late = coordinator.submit_answer(&answer(42, users[1], "blue")).unwrap();
        assert!(late.correct);
        assert_eq!(late.awarded_to_user_id, None);
        assert_eq!(late.points_awarded, 0);

        let wrong = coordinator.submit_answer(&answer(43, users[1], "red")).unwrap();
        assert!(!wrong.correct);

        let events = coordinator.publisher.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, Topic::Session(session_id));

        let points = coordinator.team_points(team_id).unwrap();
        assert_eq!(points.players[0].user_id, users[0]);
        assert_eq!(points.players[0].points, 25);
        assert_eq!(points.players[1].points, 15);

        let session = coordinator.get_session(session_id).unwrap();
        assert_eq!(session.current_puzzle_id, Some(PuzzleId::new(43)));
    }

    #[test]
    fn test_submission_gating() {
        let coordinator = coordinator();
        let (team_id, users) = team_with_players(&coordinator, Capacity::Default, &["a"]);
        let outsider = coordinator.register_user("outsider").unwrap();
        let session = coordinator
            .create_session(team_id, vec![Puzzle::exact(PuzzleId::new(7), "x")])
            .unwrap();

        assert_eq!(
            coordinator.submit_answer(&answer(7, users[0], "x")),
            Err(session::Error::NotActive(session.id).into())
        );

        coordinator.start_countdown(session.id, ignore).unwrap();
        coordinator.start_game(session.id, ignore).unwrap();
        assert_eq!(
            coordinator.submit_answer(&answer(7, outsider.id, "x")),
            Err(session::Error::NotPlaying {
                user: outsider.id,
                session: session.id,
            }
            .into())
        );
        assert!(
            coordinator
                .submit_answer(&answer(7, users[0], &"x".repeat(201)))
                .is_err()
        );

        coordinator.end_game(session.id).unwrap();
        assert_eq!(
            coordinator.submit_answer(&answer(7, users[0], "x")),
            Err(session::Error::NotActive(session.id).into())
        );
        assert_eq!(
            coordinator.leave_team(users[0]),
            Err(session::Error::Finished(session.id).into())
        );
    }

    #[test]
    fn test_decay_eliminates_and_finishes() {
        let config = Config {
            starting_points: 2,
            ..Config::default()
        };
        let coordinator = Coordinator::new(config, Recorder::default()).unwrap();
        let (team_id, users) = team_with_players(&coordinator, Capacity::Default, &["a", "b"]);
        let session_id = active_session(
            &coordinator,
            team_id,
            vec![Puzzle::exact(PuzzleId::new(1), "x").with_points(1)],
        );
        coordinator.submit_answer(&answer(1, users[1], "x")).unwrap();

        let mut alarms = Vec::new();
        let decay = AlarmMessage::PointDecay(session_id);
        assert_eq!(
            coordinator.receive_alarm(decay, |alarm, _| alarms.push(alarm)),
            Ok(None)
        );
        assert_eq!(
            coordinator.receive_alarm(decay, |alarm, _| alarms.push(alarm)),
            Ok(None)
        );
        assert_eq!(alarms, vec![decay, decay]);
        assert_eq!(
            coordinator.submit_answer(&answer(1, users[0], "x")),
            Err(session::Error::PlayerEliminated(users[0]).into())
        );

        let finished = coordinator
            .receive_alarm(decay, |alarm, _| alarms.push(alarm))
            .unwrap()
            .unwrap();
        assert_eq!(finished.status, SessionStatus::Finished);
        assert!(finished.survival_time_seconds.is_some());
        assert_eq!(alarms.len(), 2);

        let result = coordinator.game_result(session_id).unwrap();
        assert_eq!(result.puzzles_solved, 1);
        let winner = result
            .players
            .iter()
            .find(|player| player.user_id == users[1])
            .unwrap();
        assert_eq!(winner.puzzles_solved, 1);
        assert_eq!(result.players.len(), 2);

        assert_eq!(coordinator.receive_alarm(decay, ignore), Ok(None));
    }

    #[test]
    fn test_game_result_requires_finished() {
        let coordinator = coordinator();
        let (team_id, _) = team_with_players(&coordinator, Capacity::Default, &["a"]);
        let session_id = active_session(&coordinator, team_id, Vec::new());

        assert_eq!(
            coordinator.game_result(session_id),
            Err(session::Error::NotFinished(session_id).into())
        );
    }

    #[test]
    fn test_handle_maps_failures() {
        let coordinator = coordinator();

        let response = coordinator.handle(
            Request::JoinTeam {
                user_id: UserId::new(1),
                team_id: TeamId::new(9),
            },
            ignore,
        );

        match response {
            Response::Failure(failure) => {
                assert!(!failure.success);
                assert_eq!(failure.kind, crate::ErrorKind::Validation);
                assert_eq!(failure.message, "team 9 not found");
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_handle_decodes_requests() {
        let coordinator = coordinator();

        let request: Request =
            serde_json::from_str(r#"{"RegisterUser": {"username": "alice"}}"#).unwrap();
        let Response::User(user) = coordinator.handle(request, ignore) else {
            panic!("expected a user");
        };

        let request: Request = serde_json::from_str(
            r#"{"CreateTeam": {"name": "Owls", "capacity": {"bounded": 3}}}"#,
        )
        .unwrap();
        let Response::Team(team) = coordinator.handle(request, ignore) else {
            panic!("expected a team");
        };
        assert_eq!(team.max_players, Some(3));

        let request: Request = serde_json::from_value(serde_json::json!({
            "JoinTeam": {"user_id": user.id, "team_id": team.id}
        }))
        .unwrap();
        assert!(matches!(
            coordinator.handle(request, ignore),
            Response::Team(team) if team.player_count == 1
        ));

        let request: Request = serde_json::from_str(r#""ListAvailableTeams""#).unwrap();
        assert!(matches!(
            coordinator.handle(request, ignore),
            Response::Teams(teams) if teams.len() == 1
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            palette: Vec::new(),
            ..Config::default()
        };

        assert!(Coordinator::new(config, Recorder::default()).is_err());
    }
}
