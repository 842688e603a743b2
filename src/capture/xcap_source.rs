//! Monitor capture using the `xcap` crate.
//!
//! This is the infrastructure layer for macOS and Linux. It talks to the
//! OS through xcap, then hands whole-monitor images to the pure
//! composition in `region.rs`.

use xcap::Monitor;

use super::region::{compose_region, MonitorImage};
use super::{CaptureError, PixelBuffer, ScreenSource};
use crate::geometry::Rect;

#[derive(Debug, Default, Clone, Copy)]
pub struct XcapSource;

impl XcapSource {
    fn monitors() -> Result<Vec<Monitor>, CaptureError> {
        let monitors =
            Monitor::all().map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;
        if monitors.is_empty() {
            return Err(CaptureError::NoMonitor);
        }
        Ok(monitors)
    }

    fn bounds_of(monitor: &Monitor) -> Result<Rect, CaptureError> {
        let read = |e: xcap::XCapError| CaptureError::MonitorEnumeration(e.to_string());
        Ok(Rect::new(
            monitor.x().map_err(read)?,
            monitor.y().map_err(read)?,
            monitor.width().map_err(read)?,
            monitor.height().map_err(read)?,
        ))
    }
}

impl ScreenSource for XcapSource {
    fn primary_bounds(&self) -> Result<Rect, CaptureError> {
        let monitors = Self::monitors()?;
        let primary = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            // Fallback: if no monitor reports as primary, use the first one
            .or_else(|| monitors.first())
            .ok_or(CaptureError::NoMonitor)?;
        Self::bounds_of(primary)
    }

    fn virtual_bounds(&self) -> Result<Rect, CaptureError> {
        let mut bounds = Rect::default();
        for monitor in Self::monitors()? {
            bounds = bounds.union(&Self::bounds_of(&monitor)?);
        }
        Ok(bounds)
    }

    fn grab(&self, rect: Rect) -> Result<PixelBuffer, CaptureError> {
        let mut images = Vec::new();
        for monitor in Self::monitors()? {
            let bounds = Self::bounds_of(&monitor)?;
            if rect.intersection(&bounds).is_none() {
                continue;
            }
            let image = monitor.capture_image().map_err(|e| CaptureError::ResourceFailure {
                step: "capture_image",
                detail: e.to_string(),
            })?;
            images.push(MonitorImage { bounds, image });
        }

        Ok(compose_region(rect, &images)?)
    }
}
