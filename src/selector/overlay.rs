//! Selection overlay compositor.
//!
//! Produces one BGRA frame the size of the virtual screen: a dimmed
//! backdrop, a transparent hole over the selection, an aqua border and,
//! for selections large enough to read, a `W x H` size label kept inside
//! the surface.

use crate::capture::PixelBuffer;
use crate::geometry::Rect;

/// Semi-transparent black, premultiplied.
const DIM: [u8; 4] = [0, 0, 0, 128];
const HOLE: [u8; 4] = [0, 0, 0, 0];
/// Aqua (0, 255, 255) in BGRA.
const BORDER: [u8; 4] = [255, 255, 0, 255];
const LABEL_BACKGROUND: [u8; 4] = [32, 32, 32, 230];
const LABEL_TEXT: [u8; 4] = [255, 255, 255, 255];

const BORDER_WIDTH: i64 = 2;

/// Labels are drawn only once the selection exceeds this size.
pub const LABEL_MIN_WIDTH: u32 = 50;
pub const LABEL_MIN_HEIGHT: u32 = 20;

const GLYPH_SCALE: u32 = 2;
const GLYPH_WIDTH: u32 = 3 * GLYPH_SCALE;
const GLYPH_HEIGHT: u32 = 5 * GLYPH_SCALE;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + GLYPH_SCALE;
const LABEL_PADDING: u32 = 4;
const LABEL_GAP: i64 = 4;

/// Renders the overlay for `selection` (absolute coordinates) over a
/// surface covering `bounds`. `None` yields a fully transparent frame.
pub fn compose_overlay(bounds: Rect, selection: Option<Rect>) -> PixelBuffer {
    let mut frame = PixelBuffer::new(bounds.width, bounds.height);
    let Some(selection) = selection else {
        return frame;
    };

    fill(&mut frame, Rect::new(0, 0, bounds.width, bounds.height), DIM);

    let local = to_local(bounds, selection);
    fill(&mut frame, local, HOLE);
    stroke(&mut frame, local);

    if selection.width > LABEL_MIN_WIDTH && selection.height > LABEL_MIN_HEIGHT {
        let text = size_label(&selection);
        let size = label_size(&text);
        let (x, y) = label_origin((bounds.width, bounds.height), local, size);
        draw_label(&mut frame, x, y, size, &text);
    }

    frame
}

/// Text shown next to the selection.
pub fn size_label(selection: &Rect) -> String {
    format!("{} x {}", selection.width, selection.height)
}

/// Pixel size of the label box for `text`.
pub fn label_size(text: &str) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    let text_width = (chars * GLYPH_ADVANCE).saturating_sub(GLYPH_SCALE);
    (text_width + 2 * LABEL_PADDING, GLYPH_HEIGHT + 2 * LABEL_PADDING)
}

/// Top-left of the label box in surface coordinates.
///
/// Prefers just above the selection's top-left corner, drops inside the
/// selection when there is no room above, and is always clamped so the
/// whole box stays on the surface.
pub fn label_origin(surface: (u32, u32), selection: Rect, label: (u32, u32)) -> (u32, u32) {
    let (surface_w, surface_h) = (surface.0 as i64, surface.1 as i64);
    let (label_w, label_h) = (label.0 as i64, label.1 as i64);

    let mut y = selection.y as i64 - LABEL_GAP - label_h;
    if y < 0 {
        y = selection.y as i64 + LABEL_GAP;
    }
    let x = (selection.x as i64).clamp(0, (surface_w - label_w).max(0));
    let y = y.clamp(0, (surface_h - label_h).max(0));
    (x as u32, y as u32)
}

fn to_local(bounds: Rect, rect: Rect) -> Rect {
    Rect::new(
        (rect.x as i64 - bounds.x as i64) as i32,
        (rect.y as i64 - bounds.y as i64) as i32,
        rect.width,
        rect.height,
    )
}

fn fill(frame: &mut PixelBuffer, rect: Rect, bgra: [u8; 4]) {
    let surface = Rect::new(0, 0, frame.width(), frame.height());
    let Some(clip) = surface.intersection(&rect) else {
        return;
    };
    for y in clip.y as u32..clip.y as u32 + clip.height {
        let row = frame.row_mut(y);
        for x in clip.x as usize..clip.x as usize + clip.width as usize {
            row[x * 4..x * 4 + 4].copy_from_slice(&bgra);
        }
    }
}

/// Border straddles the selection edge: one pixel outside, one inside.
fn stroke(frame: &mut PixelBuffer, rect: Rect) {
    let half = BORDER_WIDTH / 2;
    let outer = (
        rect.x as i64 - half,
        rect.y as i64 - half,
        rect.right() + half,
        rect.bottom() + half,
    );
    let inner = (
        rect.x as i64 + half,
        rect.y as i64 + half,
        rect.right() - half,
        rect.bottom() - half,
    );

    let band = |left: i64, top: i64, right: i64, bottom: i64| {
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(
            left as i32,
            top as i32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    };

    let edges = [
        band(outer.0, outer.1, outer.2, inner.1),
        band(outer.0, inner.3, outer.2, outer.3),
        band(outer.0, inner.1, inner.0, inner.3),
        band(inner.2, inner.1, outer.2, inner.3),
    ];
    for edge in edges.into_iter().flatten() {
        fill(frame, edge, BORDER);
    }
}

fn draw_label(frame: &mut PixelBuffer, x: u32, y: u32, size: (u32, u32), text: &str) {
    fill(
        frame,
        Rect::new(x as i32, y as i32, size.0, size.1),
        LABEL_BACKGROUND,
    );

    let mut pen_x = x + LABEL_PADDING;
    let pen_y = y + LABEL_PADDING;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..3u32 {
                    if bits & (0b100 >> col) == 0 {
                        continue;
                    }
                    fill(
                        frame,
                        Rect::new(
                            (pen_x + col * GLYPH_SCALE) as i32,
                            (pen_y + row as u32 * GLYPH_SCALE) as i32,
                            GLYPH_SCALE,
                            GLYPH_SCALE,
                        ),
                        LABEL_TEXT,
                    );
                }
            }
        }
        pen_x += GLYPH_ADVANCE;
    }
}

/// 3x5 bitmaps; the label only ever needs digits, `x` and space.
fn glyph(ch: char) -> Option<[u8; 5]> {
    let rows = match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'x' => [0b000, 0b101, 0b010, 0b101, 0b000],
        _ => return None,
    };
    Some(rows)
}
