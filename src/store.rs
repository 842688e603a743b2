//! In-memory batch of captures awaiting export.
//!
//! Insertion order is page order. Entries are never reordered or
//! deduplicated; the only removal is a full clear. The store is owned by
//! the control flow that issues commands, so it carries no locking.

use crate::capture::PixelBuffer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub buffer: PixelBuffer,
    pub width: u32,
    pub height: u32,
}

impl StoredImage {
    fn new(buffer: PixelBuffer) -> Self {
        Self {
            width: buffer.width(),
            height: buffer.height(),
            buffer,
        }
    }
}

#[derive(Debug, Default)]
pub struct ImageStore {
    images: Vec<StoredImage>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `buffer` and returns the new count.
    pub fn append(&mut self, buffer: PixelBuffer) -> usize {
        self.images.push(StoredImage::new(buffer));
        let count = self.images.len();
        log::debug!("[STORE] Stored image #{}", count);
        count
    }

    pub fn count(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn clear(&mut self) {
        let dropped = self.images.len();
        self.images.clear();
        log::debug!("[STORE] Cleared {} image(s)", dropped);
    }

    /// Images in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredImage> {
        self.images.iter()
    }
}
