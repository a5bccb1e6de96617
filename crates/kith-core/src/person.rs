//! Known-person identity types shared across the pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a known person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonId(pub Uuid);

impl PersonId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PersonId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier for a stored reference photo, as issued by the host's
/// photo storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoId(pub String);

impl From<&str> for PhotoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for PhotoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A person the user knows, as recorded by the host's registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownPerson {
    pub id: PersonId,
    pub display_name: String,
    /// Relationship to the user ("daughter", "neighbour", ...), spoken
    /// alongside the name when a match is announced.
    pub relationship: String,
    pub reference_photos: Vec<PhotoId>,
}

/// Where a match decision came from. Offline matches are weaker evidence
/// and every consumer must be able to tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchSource {
    Cloud,
    Offline,
}

impl std::fmt::Display for MatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchSource::Cloud => f.write_str("cloud"),
            MatchSource::Offline => f.write_str("offline"),
        }
    }
}

/// A confirmed identity match on the 0 to 100 display scale.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionMatch {
    pub person_id: PersonId,
    pub similarity: f32,
    pub source: MatchSource,
}
