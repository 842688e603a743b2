//! Display-memory capture via Windows GDI.
//!
//! This module is only compiled on Windows. Every handle obtained here is
//! registered in a `ResourceScope`, so the screen DC, memory DC, bitmap
//! and the previously selected object are given back on every exit path,
//! last acquired first.

use std::mem;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXSCREEN, SM_CXVIRTUALSCREEN, SM_CYSCREEN, SM_CYVIRTUALSCREEN,
    SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
};

use super::scope::ResourceScope;
use super::{signed_extent, CaptureError, PixelBuffer, ScreenSource, BYTES_PER_PIXEL};
use crate::geometry::Rect;

#[derive(Debug, Default, Clone, Copy)]
pub struct GdiSource;

impl ScreenSource for GdiSource {
    fn primary_bounds(&self) -> Result<Rect, CaptureError> {
        let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if w <= 0 || h <= 0 {
            return Err(CaptureError::NoMonitor);
        }
        Ok(Rect::new(0, 0, w as u32, h as u32))
    }

    fn virtual_bounds(&self) -> Result<Rect, CaptureError> {
        let (x, y, w, h) = unsafe {
            (
                GetSystemMetrics(SM_XVIRTUALSCREEN),
                GetSystemMetrics(SM_YVIRTUALSCREEN),
                GetSystemMetrics(SM_CXVIRTUALSCREEN),
                GetSystemMetrics(SM_CYVIRTUALSCREEN),
            )
        };
        if w <= 0 || h <= 0 {
            return Err(CaptureError::NoMonitor);
        }
        Ok(Rect::new(x, y, w as u32, h as u32))
    }

    fn grab(&self, rect: Rect) -> Result<PixelBuffer, CaptureError> {
        let (width, height) = signed_extent(rect)?;
        let mut scope = ResourceScope::new();

        let screen_dc = scope.acquire(
            "GetDC",
            || {
                let dc = unsafe { GetDC(HWND::default()) };
                (!dc.is_invalid()).then_some(dc)
            },
            |dc| unsafe {
                ReleaseDC(HWND::default(), dc);
            },
        )?;

        let mem_dc = scope.acquire(
            "CreateCompatibleDC",
            || {
                let dc = unsafe { CreateCompatibleDC(screen_dc) };
                (!dc.is_invalid()).then_some(dc)
            },
            |dc| unsafe {
                let _ = DeleteDC(dc);
            },
        )?;

        let bitmap = scope.acquire(
            "CreateCompatibleBitmap",
            || {
                let bmp = unsafe { CreateCompatibleBitmap(screen_dc, width, height) };
                (!bmp.is_invalid()).then_some(bmp)
            },
            |bmp| unsafe {
                let _ = DeleteObject(bmp);
            },
        )?;

        scope.acquire(
            "SelectObject",
            || {
                let previous = unsafe { SelectObject(mem_dc, bitmap) };
                (!previous.is_invalid()).then_some(previous)
            },
            move |previous| unsafe {
                SelectObject(mem_dc, previous);
            },
        )?;

        let copied = unsafe {
            BitBlt(mem_dc, 0, 0, width, height, screen_dc, rect.x, rect.y, SRCCOPY)
        };
        scope.check("BitBlt", copied.is_ok())?;

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                // Negative height requests top-down rows.
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut pixels = vec![0u8; rect.width as usize * rect.height as usize * BYTES_PER_PIXEL];
        let lines = unsafe {
            GetDIBits(
                mem_dc,
                bitmap,
                0,
                rect.height,
                Some(pixels.as_mut_ptr().cast()),
                &mut info,
                DIB_RGB_COLORS,
            )
        };
        scope.check("GetDIBits", lines == height)?;

        // GDI leaves the alpha byte undefined for screen bitmaps.
        for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px[3] = 255;
        }

        drop(scope);
        PixelBuffer::from_bgra(rect.width, rect.height, pixels)
    }
}
