//! Screen capture domain: public API.
//!
//! This module owns all pixel acquisition. External code goes through
//! `Capturer`, which picks the full-screen rectangle, rejects overlapping
//! calls and delegates the OS work to a `ScreenSource` backend.

mod buffer;
#[cfg(target_os = "windows")]
mod gdi;
pub mod region;
pub mod scope;
#[cfg_attr(target_os = "windows", allow(dead_code))]
mod xcap_source;

pub use buffer::{PixelBuffer, PixelFormat, BYTES_PER_PIXEL};
#[cfg(target_os = "windows")]
pub use gdi::GdiSource;
pub use xcap_source::XcapSource;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::geometry::Rect;
use region::CropError;

/// What to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// The primary display, at its reported size.
    FullScreen,
    /// Absolute virtual-screen coordinates.
    Region(Rect),
}

/// OS backend that reads display memory.
///
/// `grab` is synchronous and must release whatever it acquired before
/// returning, whether it succeeds or not.
pub trait ScreenSource: Send + Sync {
    fn primary_bounds(&self) -> Result<Rect, CaptureError>;

    /// Union of all connected displays.
    fn virtual_bounds(&self) -> Result<Rect, CaptureError>;

    fn grab(&self, rect: Rect) -> Result<PixelBuffer, CaptureError>;
}

/// The platform's default backend.
pub fn system_source() -> Box<dyn ScreenSource> {
    #[cfg(target_os = "windows")]
    {
        Box::new(GdiSource)
    }
    #[cfg(not(target_os = "windows"))]
    {
        Box::new(XcapSource)
    }
}

/// Front door for all captures. At most one capture runs at a time; a
/// second caller gets `CaptureError::Busy` instead of waiting.
pub struct Capturer {
    source: Box<dyn ScreenSource>,
    in_flight: AtomicBool,
}

impl Capturer {
    pub fn new(source: Box<dyn ScreenSource>) -> Self {
        Self {
            source,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn system() -> Self {
        Self::new(system_source())
    }

    pub fn virtual_bounds(&self) -> Result<Rect, CaptureError> {
        self.source.virtual_bounds()
    }

    /// Captures `target` into a fresh BGRA buffer. Blocks until the OS
    /// read-back completes.
    pub fn capture(&self, target: CaptureTarget) -> Result<PixelBuffer, CaptureError> {
        let _guard = InFlight::enter(&self.in_flight)?;
        let start = Instant::now();

        let rect = match target {
            CaptureTarget::FullScreen => self.source.primary_bounds()?,
            CaptureTarget::Region(rect) => rect,
        };
        if rect.is_empty() {
            return Err(CaptureError::ZeroDimension);
        }
        signed_extent(rect)?;

        let buffer = self.source.grab(rect)?;
        if buffer.width() != rect.width || buffer.height() != rect.height {
            return Err(CaptureError::BufferSizeMismatch {
                expected: rect.width as usize * rect.height as usize * BYTES_PER_PIXEL,
                actual: buffer.pixels().len(),
            });
        }

        log::info!(
            "[CAPTURE] Captured {} in {}ms ({} bytes)",
            rect,
            start.elapsed().as_millis(),
            buffer.pixels().len()
        );
        Ok(buffer)
    }
}

/// Width and height as the signed sizes OS capture calls take.
pub(crate) fn signed_extent(rect: Rect) -> Result<(i32, i32), CaptureError> {
    match (i32::try_from(rect.width), i32::try_from(rect.height)) {
        (Ok(width), Ok(height)) => Ok((width, height)),
        _ => Err(CaptureError::TooLarge(rect)),
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Result<Self, CaptureError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CaptureError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Another capture is already in progress")]
    Busy,

    #[error("Capture resource failure at {step}: {detail}")]
    ResourceFailure { step: &'static str, detail: String },

    #[error("Failed to enumerate monitors: {0}")]
    MonitorEnumeration(String),

    #[error("No monitor found")]
    NoMonitor,

    #[error("Capture rectangle has zero width or height")]
    ZeroDimension,

    #[error("Capture rectangle {0} exceeds the OS coordinate range")]
    TooLarge(Rect),

    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Region(#[from] CropError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    struct FakeSource {
        primary: Rect,
    }

    impl ScreenSource for FakeSource {
        fn primary_bounds(&self) -> Result<Rect, CaptureError> {
            Ok(self.primary)
        }

        fn virtual_bounds(&self) -> Result<Rect, CaptureError> {
            Ok(self.primary)
        }

        fn grab(&self, rect: Rect) -> Result<PixelBuffer, CaptureError> {
            Ok(PixelBuffer::new(rect.width, rect.height))
        }
    }

    struct BlockingSource {
        entered: Arc<Barrier>,
        release: Arc<Barrier>,
    }

    impl ScreenSource for BlockingSource {
        fn primary_bounds(&self) -> Result<Rect, CaptureError> {
            Ok(Rect::new(0, 0, 4, 4))
        }

        fn virtual_bounds(&self) -> Result<Rect, CaptureError> {
            Ok(Rect::new(0, 0, 4, 4))
        }

        fn grab(&self, rect: Rect) -> Result<PixelBuffer, CaptureError> {
            self.entered.wait();
            self.release.wait();
            Ok(PixelBuffer::new(rect.width, rect.height))
        }
    }

    #[test]
    fn full_screen_uses_primary_size() {
        let capturer = Capturer::new(Box::new(FakeSource {
            primary: Rect::new(0, 0, 320, 200),
        }));
        let buf = capturer.capture(CaptureTarget::FullScreen).unwrap();
        assert_eq!((buf.width(), buf.height()), (320, 200));
        assert_eq!(buf.stride(), 320 * 4);
        assert_eq!(buf.pixels().len(), buf.stride() * 200);
    }

    #[test]
    fn empty_region_is_rejected() {
        let capturer = Capturer::new(Box::new(FakeSource {
            primary: Rect::new(0, 0, 10, 10),
        }));
        let result = capturer.capture(CaptureTarget::Region(Rect::new(3, 3, 0, 8)));
        assert!(matches!(result, Err(CaptureError::ZeroDimension)));
    }

    #[test]
    fn extent_beyond_i32_is_rejected_before_grab() {
        let capturer = Capturer::new(Box::new(FakeSource {
            primary: Rect::new(0, 0, 10, 10),
        }));
        let huge = Rect::new(0, 0, i32::MAX as u32 + 1, 4);
        let result = capturer.capture(CaptureTarget::Region(huge));
        assert!(matches!(result, Err(CaptureError::TooLarge(r)) if r == huge));

        assert_eq!(signed_extent(Rect::new(-5, -5, i32::MAX as u32, 7)).unwrap(), (i32::MAX, 7));
        assert!(signed_extent(Rect::new(0, 0, 3, u32::MAX)).is_err());
    }

    #[test]
    fn overlapping_capture_is_rejected() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let capturer = Arc::new(Capturer::new(Box::new(BlockingSource {
            entered: entered.clone(),
            release: release.clone(),
        })));

        let first = {
            let capturer = capturer.clone();
            std::thread::spawn(move || capturer.capture(CaptureTarget::FullScreen))
        };

        entered.wait();
        let second = capturer.capture(CaptureTarget::FullScreen);
        assert!(matches!(second, Err(CaptureError::Busy)));
        release.wait();

        assert!(first.join().unwrap().is_ok());
        assert!(!capturer.in_flight.load(Ordering::SeqCst));
    }
}
