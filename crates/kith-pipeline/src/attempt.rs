//! One recognition attempt against the cloud.
//!
//! Runs as its own task so the engine loop keeps scoring frames while
//! the comparison fan-out is in flight.

use crate::registry::{KnownPersonRegistry, PhotoStorage};
use image::DynamicImage;
use kith_cloud::{CloudCapability, CloudMatch, MatchBudget};
use kith_core::frame::Frame;
use kith_core::person::PersonId;
use std::sync::Arc;

/// How the cloud round ended. `CloudFailed` is the only outcome that
/// sends the engine to the offline cache; a clean "nobody matched"
/// answer is final.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Cloud(Option<CloudMatch>),
    CloudFailed,
}

pub(crate) async fn run_cloud_attempt(
    cloud: Arc<CloudCapability>,
    registry: Arc<dyn KnownPersonRegistry>,
    photos: Arc<dyn PhotoStorage>,
    frame: Frame,
    threshold: f32,
    budget: MatchBudget,
) -> AttemptOutcome {
    let matcher = match cloud.matcher() {
        Ok(matcher) => matcher,
        Err(_) => return AttemptOutcome::CloudFailed,
    };

    let candidates = load_candidates(registry.as_ref(), photos.as_ref());
    if candidates.is_empty() {
        tracing::debug!("no reference photos enrolled, attempt resolves unmatched");
        return AttemptOutcome::Cloud(None);
    }

    let pairs: usize = candidates.iter().map(|(_, photos)| photos.len()).sum();
    tracing::debug!(
        people = candidates.len(),
        pairs,
        "comparing probe against enrolled references"
    );

    match matcher
        .find_best_match(&frame.image, &candidates, threshold, budget)
        .await
    {
        Ok(best) => AttemptOutcome::Cloud(best),
        Err(e) => {
            tracing::warn!(error = %e, "cloud attempt failed, trying offline cache");
            AttemptOutcome::CloudFailed
        }
    }
}

/// Resolve every enrolled person's reference photos to pixels. Photos
/// the storage cannot produce are skipped; people left with no photos
/// drop out of the round.
fn load_candidates(
    registry: &dyn KnownPersonRegistry,
    photos: &dyn PhotoStorage,
) -> Vec<(PersonId, Vec<DynamicImage>)> {
    let mut candidates = Vec::new();
    for person in registry.known_persons() {
        let mut images = Vec::new();
        for photo in registry.reference_photos(&person.id) {
            match photos.load_photo(&photo) {
                Some(image) => images.push(image),
                None => {
                    tracing::warn!(person = %person.id, photo = %photo, "reference photo missing, skipped");
                }
            }
        }
        if !images.is_empty() {
            candidates.push((person.id, images));
        }
    }
    candidates
}
