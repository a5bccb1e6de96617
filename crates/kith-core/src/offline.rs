//! Offline fallback matcher: a bounded, time-expiring cache of face
//! fingerprints, persisted as one JSON file.
//!
//! Every accepted cloud match deposits a record here, so the pipeline
//! can still name recently-seen people when the network is gone. The
//! cache is deliberately small and forgetful; it is a convenience layer,
//! not a face database.

use crate::fingerprint::FaceFingerprint;
use crate::person::PersonId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// --- Cache policy ---
const MAX_RECORDS_PER_PERSON: usize = 5;
const MAX_RECORDS_TOTAL: usize = 50;
const RECORD_TTL_DAYS: i64 = 7;

/// Minimum similarity an offline match must clear before it is reported.
const MATCH_FLOOR: f32 = 0.6;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One cached sighting of a known person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFaceRecord {
    pub person_id: PersonId,
    pub fingerprint: FaceFingerprint,
    /// Small JPEG of the matched face, for host UI use while offline.
    #[serde(with = "b64", default)]
    pub thumbnail: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Best offline candidate for a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineMatch {
    pub person_id: PersonId,
    /// Rescaled to the 0 to 100 display range used by the cloud matcher.
    pub similarity: f32,
}

/// Bounded, time-expiring fingerprint cache with weighted-feature
/// matching.
///
/// The whole cache lives in memory and the backing file is rewritten
/// after every mutation. All mutations happen on the coordinating task,
/// so there is no interior locking.
pub struct OfflineMatcher {
    records: Vec<CachedFaceRecord>,
    path: PathBuf,
}

impl OfflineMatcher {
    /// Load the cache from `path`, purging expired records.
    ///
    /// A missing file is an empty cache. An unreadable or corrupt file
    /// is logged and treated as empty; a damaged cache must never block
    /// startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<CachedFaceRecord>>(&bytes) {
                Ok(records) => records,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "offline cache corrupt, starting empty");
                    Vec::new()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "offline cache unreadable, starting empty");
                Vec::new()
            }
        };

        let mut matcher = Self { records, path };
        let dropped = matcher.purge_expired(Utc::now());
        if dropped > 0 {
            tracing::info!(dropped, "purged expired offline records");
            if let Err(error) = matcher.persist() {
                tracing::warn!(%error, "offline cache write failed");
            }
        }
        tracing::debug!(records = matcher.records.len(), path = %matcher.path.display(), "offline cache loaded");
        matcher
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a record, enforcing expiry and both capacity caps, then
    /// rewrite the backing file.
    pub fn insert(&mut self, record: CachedFaceRecord) -> Result<(), CacheError> {
        self.purge_expired(Utc::now());
        self.records.push(record);
        self.enforce_caps();
        self.persist()
    }

    /// Best match for a probe fingerprint, if any record clears the floor.
    pub fn best_match(&self, probe: &FaceFingerprint) -> Option<OfflineMatch> {
        let mut best_sim = 0.0f32;
        let mut best_person = None;

        for record in &self.records {
            let sim = probe.similarity(&record.fingerprint);
            if sim > best_sim {
                best_sim = sim;
                best_person = Some(record.person_id);
            }
        }

        match best_person {
            Some(person_id) if best_sim > MATCH_FLOOR => Some(OfflineMatch {
                person_id,
                similarity: best_sim * 100.0,
            }),
            _ => None,
        }
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = Duration::days(RECORD_TTL_DAYS);
        let before = self.records.len();
        self.records.retain(|r| now - r.created_at <= ttl);
        before - self.records.len()
    }

    fn enforce_caps(&mut self) {
        // Newest first, so retain keeps the freshest records per person.
        self.records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut per_person: HashMap<PersonId, usize> = HashMap::new();
        self.records.retain(|r| {
            let count = per_person.entry(r.person_id).or_insert(0);
            *count += 1;
            *count <= MAX_RECORDS_PER_PERSON
        });

        self.records.truncate(MAX_RECORDS_TOTAL);

        // Back to chronological order for stable files.
        self.records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    fn persist(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(&self.records)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// JPEG bytes as base64 strings, keeping the cache file readable.
mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
