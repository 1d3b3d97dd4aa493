//! Username and team name management
//!
//! This module validates user-chosen names, filters inappropriate content,
//! guarantees uniqueness, and generates names for teams created without one.

use std::hash::Hash;

use dashmap::{DashMap, mapref::entry::Entry};
use heck::ToTitleCase;
use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants;

/// Defines the style of automatically generated team names
#[derive(Debug, Clone, Copy, Deserialize, Serialize, garde::Validate)]
pub enum NameStyle {
    /// Roman-style names (praenomen + nomen, optionally + cognomen)
    Roman(#[garde(range(min = 2, max = 3))] usize),
    /// Pet-style names (adjective + animal combinations)
    Petname(#[garde(range(min = 2, max = 3))] usize),
}

impl Default for NameStyle {
    /// Default name style is Petname with 2 words
    fn default() -> Self {
        Self::Petname(2)
    }
}

/// Trait for generating names according to a specific naming scheme.
pub trait NamingScheme {
    /// Generates and returns a name according to the naming scheme.
    fn get_name(&self) -> String;

    /// Generates the plural form of a name, used for teams ("Brave Otters").
    fn get_plural_name(&self) -> String {
        pluralizer::pluralize(&self.get_name(), 2, false)
    }
}

impl NamingScheme for NameStyle {
    fn get_name(&self) -> String {
        match self {
            Self::Roman(count) => romanname::romanname(romanname::NameConfig {
                praenomen: *count > 2,
            }),
            Self::Petname(count) => petname::petname(*count as u8, " ").unwrap_or_default(),
        }
        .to_title_case()
    }
}

/// Errors that can occur during name validation and assignment
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested name is already in use
    #[error("name already in-use")]
    Used,
    /// The name is empty or contains only whitespace
    #[error("name cannot be empty")]
    Empty,
    /// The name contains inappropriate content
    #[error("name is inappropriate")]
    Sinful,
    /// The name exceeds the maximum allowed length
    #[error("name is too long")]
    TooLong,
    /// No generated name was usable
    #[error("no unused name could be generated")]
    Exhausted,
}

/// Validates a requested name and returns its trimmed form
///
/// # Errors
///
/// * `Error::TooLong` - Name exceeds `max_length` characters
/// * `Error::Empty` - Name is empty after trimming whitespace
/// * `Error::Sinful` - Name contains inappropriate content
pub fn clean(name: &str, max_length: usize) -> Result<String, Error> {
    if name.chars().count() > max_length {
        return Err(Error::TooLong);
    }
    let name = rustrict::trim_whitespace(name);
    if name.is_empty() {
        return Err(Error::Empty);
    }
    if name.is_inappropriate() {
        return Err(Error::Sinful);
    }
    Ok(name.to_owned())
}

/// Unique names keyed by the id of their owner
///
/// Claiming a name is atomic: two callers racing for the same name never
/// both succeed.
#[derive(Debug)]
pub struct NameBook<K> {
    owners: DashMap<String, K>,
    max_length: usize,
}

impl<K: Copy + Eq + Hash> NameBook<K> {
    /// Creates an empty book accepting names up to `max_length` characters
    pub fn new(max_length: usize) -> Self {
        Self {
            owners: DashMap::new(),
            max_length,
        }
    }

    /// Validates `name` and records `owner` as its holder
    ///
    /// # Errors
    ///
    /// Any error of [`clean`], or `Error::Used` if another owner holds the name.
    pub fn claim(&self, owner: K, name: &str) -> Result<String, Error> {
        let name = clean(name, self.max_length)?;
        match self.owners.entry(name.clone()) {
            Entry::Occupied(existing) if *existing.get() == owner => Ok(name),
            Entry::Occupied(_) => Err(Error::Used),
            Entry::Vacant(slot) => {
                slot.insert(owner);
                Ok(name)
            }
        }
    }

    /// Claims a freshly generated name, retrying until an unused one comes up
    ///
    /// # Errors
    ///
    /// Returns `Error::Exhausted` if no usable name turns up within
    /// [`constants::team::NAME_GENERATION_ATTEMPTS`] tries.
    pub fn claim_generated<S: NamingScheme>(&self, owner: K, scheme: &S) -> Result<String, Error> {
        (0..constants::team::NAME_GENERATION_ATTEMPTS)
            .find_map(|_| self.claim(owner, &scheme.get_plural_name()).ok())
            .ok_or(Error::Exhausted)
    }

    /// Releases `name` if `owner` holds it
    pub fn release(&self, owner: K, name: &str) {
        self.owners.remove_if(name, |_, holder| *holder == owner);
    }

    /// Returns the holder of `name`
    pub fn get_id(&self, name: &str) -> Option<K> {
        self.owners.get(name).map(|holder| *holder)
    }
}
