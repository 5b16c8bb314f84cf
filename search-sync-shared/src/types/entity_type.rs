//! Entity type tags.
//!
//! Every record kind that can live in the search index is enumerated here.
//! Job payloads carry the tag as a string; workers turn it back into an
//! `EntityType` with [`EntityType::from_str`] and reject anything unknown.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of source records the pipeline knows how to index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Article,
    User,
    Tag,
    Reaction,
}

impl EntityType {
    /// All entity types, in registration order.
    pub const ALL: [EntityType; 4] = [
        EntityType::Article,
        EntityType::User,
        EntityType::Tag,
        EntityType::Reaction,
    ];

    /// The tag as it appears in job payloads and metric tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Article => "Article",
            EntityType::User => "User",
            EntityType::Tag => "Tag",
            EntityType::Reaction => "Reaction",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityType(pub String);

impl fmt::Display for UnknownEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown entity type '{}'", self.0)
    }
}

impl std::error::Error for UnknownEntityType {}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    /// Parsing is exact: `"article"` is not `"Article"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEntityType(s.to_string()))
    }
}
