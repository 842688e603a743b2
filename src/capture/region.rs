//! Pure region composition logic (functional core).
//!
//! This module has zero infrastructure dependencies.
//! It takes whole-monitor images in, returns the requested region as a
//! BGRA buffer. A region may straddle several monitors; pixels that no
//! monitor covers stay transparent.

use image::{imageops, RgbaImage};

use super::PixelBuffer;
use crate::geometry::Rect;

/// One monitor's screenshot and where it sits on the virtual screen.
pub struct MonitorImage {
    pub bounds: Rect,
    pub image: RgbaImage,
}

/// Copies the part of `monitor` that overlaps `region` into `dest`.
///
/// `dest` must be exactly `region.width × region.height`. Returns whether
/// anything was copied.
pub fn blit_monitor(
    dest: &mut PixelBuffer,
    region: Rect,
    monitor: &MonitorImage,
) -> Result<bool, CropError> {
    if region.is_empty() {
        return Err(CropError::ZeroDimension);
    }
    if dest.width() != region.width || dest.height() != region.height {
        return Err(CropError::DestinationMismatch {
            region: (region.width, region.height),
            dest: (dest.width(), dest.height()),
        });
    }

    let Some(overlap) = region.intersection(&monitor.bounds) else {
        return Ok(false);
    };

    // HiDPI backends hand back physical pixels for logical bounds.
    let scaled;
    let image = if monitor.image.width() != monitor.bounds.width
        || monitor.image.height() != monitor.bounds.height
    {
        log::debug!(
            "[CAPTURE] Rescaling monitor image {}x{} to {}x{}",
            monitor.image.width(),
            monitor.image.height(),
            monitor.bounds.width,
            monitor.bounds.height
        );
        scaled = imageops::resize(
            &monitor.image,
            monitor.bounds.width,
            monitor.bounds.height,
            imageops::FilterType::Triangle,
        );
        &scaled
    } else {
        &monitor.image
    };

    let src_x = (overlap.x as i64 - monitor.bounds.x as i64) as u32;
    let src_y = (overlap.y as i64 - monitor.bounds.y as i64) as u32;
    let cropped = imageops::crop_imm(image, src_x, src_y, overlap.width, overlap.height).to_image();
    let piece = PixelBuffer::from_rgba_image(&cropped);

    let dst_x = (overlap.x as i64 - region.x as i64) as usize;
    let dst_y = (overlap.y as i64 - region.y as i64) as u32;
    let row_bytes = piece.stride();
    let dst_offset = dst_x * piece.bytes_per_pixel();
    for row in 0..overlap.height {
        dest.row_mut(dst_y + row)[dst_offset..dst_offset + row_bytes]
            .copy_from_slice(piece.row(row));
    }

    Ok(true)
}

/// Builds the region buffer from every monitor image that overlaps it.
pub fn compose_region(region: Rect, monitors: &[MonitorImage]) -> Result<PixelBuffer, CropError> {
    if region.is_empty() {
        return Err(CropError::ZeroDimension);
    }

    let mut dest = PixelBuffer::new(region.width, region.height);
    let mut covered = false;
    for monitor in monitors {
        covered |= blit_monitor(&mut dest, region, monitor)?;
    }

    if !covered {
        return Err(CropError::OutOfBounds {
            requested: (region.x, region.y, region.width, region.height),
        });
    }
    Ok(dest)
}

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Crop rectangle has zero width or height")]
    ZeroDimension,

    #[error(
        "Crop rectangle ({},{},{},{}) does not overlap any monitor",
        requested.0, requested.1, requested.2, requested.3
    )]
    OutOfBounds { requested: (i32, i32, u32, u32) },

    #[error(
        "Destination {}x{} does not match region {}x{}",
        dest.0, dest.1, region.0, region.1
    )]
    DestinationMismatch { region: (u32, u32), dest: (u32, u32) },
}
