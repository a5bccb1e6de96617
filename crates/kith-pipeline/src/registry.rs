//! Host-provided directories: who is known, and where their reference
//! photos live.

use image::DynamicImage;
use kith_core::person::{KnownPerson, PersonId, PhotoId};

/// Directory of people the user has enrolled.
pub trait KnownPersonRegistry: Send + Sync {
    fn known_persons(&self) -> Vec<KnownPerson>;
    fn reference_photos(&self, person: &PersonId) -> Vec<PhotoId>;
}

/// Resolves a photo id to pixels. Returning `None` skips that photo;
/// an attempt proceeds with whatever references do load.
pub trait PhotoStorage: Send + Sync {
    fn load_photo(&self, photo: &PhotoId) -> Option<DynamicImage>;
}
