//! # warden-types: Core types for `Warden`
//!
//! This crate contains shared types used across the `Warden` system:
//! - Entity identity ([`EntityId`], [`EntityType`], [`EntityRef`])
//! - Facet identifiers ([`FacetKey`], [`FacetKeyError`])
//! - Time ([`Clock`], [`SystemClock`], [`ManualClock`])

use std::{
    fmt::{Debug, Display},
    str::FromStr,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Entity Identity - Clone (contains String, cheap to compare)
// ============================================================================

/// Opaque identifier of a principal or resource entity.
///
/// Identifiers come from the identity store and are never interpreted by
/// the engine beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

/// The kind of entity a facet is assigned to (e.g. `"user"`, `"team"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// The entity type used for authenticated principals.
    pub fn user() -> Self {
        Self("user".to_string())
    }

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityType {
    fn from(kind: &str) -> Self {
        Self(kind.to_string())
    }
}

/// A typed reference to a single entity: `(entity_type, entity_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<EntityType>, entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Shorthand for a `user` entity.
    pub fn user(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: EntityType::user(),
            entity_id: entity_id.into(),
        }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

// ============================================================================
// Facet Key - Clone (parsed once from "scope:name[:value]")
// ============================================================================

/// Separator between the components of a facet identifier string.
pub const FACET_KEY_SEPARATOR: char = ':';

/// Error returned when a facet identifier string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacetKeyError {
    #[error("facet identifier '{0}' must have the form scope:name or scope:name:value")]
    WrongArity(String),

    #[error("facet identifier '{input}' has an empty {component}")]
    EmptyComponent {
        input: String,
        component: &'static str,
    },

    #[error("facet identifier '{0}' contains whitespace")]
    Whitespace(String),
}

/// Strongly typed facet identity: `(scope, name, value?)`.
///
/// The string form `scope:name[:value]` only exists at the boundary
/// ([`FromStr`], [`Display`], serde). Inside the engine the parsed tuple is
/// the working representation.
///
/// # Examples
///
/// ```
/// use warden_types::FacetKey;
///
/// let key: FacetKey = "org-division:sales".parse().unwrap();
/// assert_eq!(key.scope(), "org-division");
/// assert_eq!(key.name(), "sales");
/// assert_eq!(key.value(), None);
/// assert_eq!(key.to_string(), "org-division:sales");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FacetKey {
    scope: String,
    name: String,
    value: Option<String>,
}

impl FacetKey {
    /// Builds a key from already-validated components.
    ///
    /// # Errors
    ///
    /// Returns [`FacetKeyError`] if any component is empty, contains
    /// whitespace, or contains the separator.
    pub fn new(
        scope: impl Into<String>,
        name: impl Into<String>,
        value: Option<String>,
    ) -> Result<Self, FacetKeyError> {
        let key = Self {
            scope: scope.into(),
            name: name.into(),
            value,
        };
        let components = [Some(&key.scope), Some(&key.name), key.value.as_ref()];
        if components
            .iter()
            .flatten()
            .any(|c| c.contains(FACET_KEY_SEPARATOR))
        {
            return Err(FacetKeyError::WrongArity(key.to_string()));
        }
        key.to_string().parse()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns true if this key has the given scope and name, ignoring value.
    pub fn matches(&self, scope: &str, name: &str) -> bool {
        self.scope == scope && self.name == name
    }
}

impl FromStr for FacetKey {
    type Err = FacetKeyError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split(FACET_KEY_SEPARATOR).collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(FacetKeyError::WrongArity(input.to_string()));
        }

        for (part, component) in parts.iter().zip(["scope", "name", "value"]) {
            if part.is_empty() {
                return Err(FacetKeyError::EmptyComponent {
                    input: input.to_string(),
                    component,
                });
            }
            if part.chars().any(char::is_whitespace) {
                return Err(FacetKeyError::Whitespace(input.to_string()));
            }
        }

        Ok(Self {
            scope: parts[0].to_string(),
            name: parts[1].to_string(),
            value: parts.get(2).map(|v| (*v).to_string()),
        })
    }
}

impl Display for FacetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{FACET_KEY_SEPARATOR}{}", self.scope, self.name)?;
        if let Some(value) = &self.value {
            write!(f, "{FACET_KEY_SEPARATOR}{value}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for FacetKey {
    type Error = FacetKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FacetKey> for String {
    fn from(key: FacetKey) -> Self {
        key.to_string()
    }
}

// ============================================================================
// Clock - injected so expiry can be evaluated deterministically
// ============================================================================

/// Source of "now" for expiry and review computations.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Used by tests and simulations to exercise lazy expiry without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================
