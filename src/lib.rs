//! # Team Coordinator
//!
//! Server-side coordination for a team-based puzzle game. This library owns
//! team membership, keeps player colors unique within each team while many
//! requests race on the same team, decides the single winner of every puzzle,
//! and drives each game session through `lobby → countdown → active →
//! finished` for all connected clients.
//!
//! The library performs no I/O of its own. A host decodes requests, passes
//! them to a [`Coordinator`], delivers the events it publishes through a
//! [`Publisher`], and fires the alarms it schedules back into
//! [`Coordinator::receive_alarm`].

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
use serde::{Deserialize, Serialize};

pub mod constants;

pub mod arbiter;
pub mod broadcast;
pub mod colors;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod names;
pub mod registry;
pub mod responses;
pub mod scores;
pub mod session;

pub use broadcast::{Event, Publisher, Topic};
pub use config::Config;
pub use coordinator::{Coordinator, Request, Response};
pub use error::{Error, ErrorKind, Result};

/// Delayed work a [`Coordinator`] asks its host to schedule
///
/// The host calls [`Coordinator::receive_alarm`] with the message once the
/// requested delay has passed. Alarms that no longer apply are ignored, so
/// the host never needs to cancel one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// The countdown of a session has run out
    CountdownElapsed(ids::SessionId),
    /// Balances of an active session are due to decay
    PointDecay(ids::SessionId),
}
