//! Camera frame type shared by every pipeline stage.

use image::DynamicImage;
use std::time::Instant;

/// Which camera produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTag {
    /// The handset's own camera.
    Phone,
    /// The paired wearable camera.
    Glasses,
}

/// A captured camera frame.
///
/// Immutable once produced. Stages move it forward; it is cloned only
/// when both the event surface and a recognition attempt need the pixels.
#[derive(Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub captured_at: Instant,
    pub origin: SourceTag,
}

impl Frame {
    pub fn new(image: DynamicImage, origin: SourceTag) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
            origin,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for Frame {
    // Pixel data is omitted; a frame can be megabytes.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("captured_at", &self.captured_at)
            .field("origin", &self.origin)
            .finish()
    }
}
