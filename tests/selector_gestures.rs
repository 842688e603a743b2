//! Integration tests for region selection gestures.

use proptest::prelude::*;

use qaflow_lib::capture::{CaptureError, Capturer, PixelBuffer, ScreenSource, BYTES_PER_PIXEL};
use qaflow_lib::capture::CaptureTarget;
use qaflow_lib::geometry::{Point, Rect};
use qaflow_lib::selector::{
    select_region, RegionSelector, SelectionSurface, SelectorEvent, SelectorState, Transition,
};

const SCREEN: Rect = Rect::new(-1920, 0, 3840, 1080);

fn gesture(selector: &mut RegionSelector, a: Point, moves: &[Point], b: Point) -> Transition {
    selector.handle(SelectorEvent::PointerDown(a));
    for &p in moves {
        selector.handle(SelectorEvent::PointerMove(p));
    }
    selector.handle(SelectorEvent::PointerUp(b))
}

fn point() -> impl Strategy<Value = Point> {
    (-1920i32..1920, 0i32..1080).prop_map(|(x, y)| Point::new(x, y))
}

proptest! {
    #[test]
    fn prop_small_drags_are_discarded(a in point(), dx in -5i32..=5, dy in -400i32..400, swap in any::<bool>()) {
        let (dx, dy) = if swap { (dy, dx) } else { (dx, dy) };
        let b = Point::new(a.x + dx, a.y + dy);
        let mut selector = RegionSelector::new(SCREEN);

        let t = gesture(&mut selector, a, &[], b);

        prop_assert!(matches!(t, Transition::Discarded(_)), "{:?}", t);
        prop_assert_eq!(selector.state(), SelectorState::Idle);
        prop_assert_eq!(selector.committed(), None);
    }

    #[test]
    fn prop_large_drags_commit_normalized(a in point(), b in point(), mid in point()) {
        prop_assume!((a.x - b.x).abs() > 5 && (a.y - b.y).abs() > 5);
        let mut selector = RegionSelector::new(SCREEN);

        let t = gesture(&mut selector, a, &[mid], b);

        let expected = Rect::new(
            a.x.min(b.x),
            a.y.min(b.y),
            a.x.abs_diff(b.x),
            a.y.abs_diff(b.y),
        );
        prop_assert_eq!(t, Transition::Committed(expected));
        prop_assert_eq!(selector.committed(), Some(expected));
    }

    #[test]
    fn prop_capture_buffer_is_tightly_packed(x in -50i32..50, y in -50i32..50, w in 1u32..64, h in 1u32..64) {
        let capturer = Capturer::new(Box::new(CheckerSource));
        let buffer = capturer.capture(CaptureTarget::Region(Rect::new(x, y, w, h))).unwrap();

        prop_assert_eq!(buffer.stride(), w as usize * BYTES_PER_PIXEL);
        prop_assert_eq!(buffer.pixels().len(), buffer.stride() * h as usize);
    }
}

struct CheckerSource;

impl ScreenSource for CheckerSource {
    fn primary_bounds(&self) -> Result<Rect, CaptureError> {
        Ok(Rect::new(0, 0, 64, 64))
    }

    fn virtual_bounds(&self) -> Result<Rect, CaptureError> {
        Ok(Rect::new(-64, -64, 128, 128))
    }

    fn grab(&self, rect: Rect) -> Result<PixelBuffer, CaptureError> {
        let mut buffer = PixelBuffer::new(rect.width, rect.height);
        for y in 0..rect.height {
            for x in 0..rect.width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                buffer.set_pixel(x, y, [v, v, v, 255]);
            }
        }
        Ok(buffer)
    }
}

// ── Scripted host surface ───────────────────────────────────────────

const HOST: Rect = Rect::new(0, 0, 200, 100);

struct ScriptedSurface {
    events: Vec<SelectorEvent>,
    opened: Option<Rect>,
    frames: Vec<(u32, u32)>,
    closed: bool,
}

impl ScriptedSurface {
    fn new(mut events: Vec<SelectorEvent>) -> Self {
        events.reverse();
        Self {
            events,
            opened: None,
            frames: Vec::new(),
            closed: false,
        }
    }
}

impl SelectionSurface for ScriptedSurface {
    fn open(&mut self, bounds: Rect) {
        self.opened = Some(bounds);
    }

    fn next_event(&mut self) -> Option<SelectorEvent> {
        self.events.pop()
    }

    fn present(&mut self, frame: &PixelBuffer) {
        self.frames.push((frame.width(), frame.height()));
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[test]
fn surface_gesture_commits_and_closes() {
    let mut surface = ScriptedSurface::new(vec![
        SelectorEvent::PointerDown(Point::new(150, 80)),
        SelectorEvent::PointerMove(Point::new(100, 50)),
        SelectorEvent::PointerMove(Point::new(20, 10)),
        SelectorEvent::PointerUp(Point::new(20, 10)),
    ]);

    let rect = select_region(&mut surface, HOST);

    assert_eq!(rect, Some(Rect::new(20, 10, 130, 70)));
    assert!(surface.closed);
    assert_eq!(surface.opened, Some(HOST));
    assert_eq!(surface.frames, vec![(200, 100), (200, 100)]);
}

#[test]
fn surface_retries_after_a_tiny_drag() {
    let mut surface = ScriptedSurface::new(vec![
        SelectorEvent::PointerDown(Point::new(10, 10)),
        SelectorEvent::PointerUp(Point::new(12, 40)),
        SelectorEvent::PointerDown(Point::new(10, 10)),
        SelectorEvent::PointerUp(Point::new(40, 40)),
    ]);

    assert_eq!(select_region(&mut surface, HOST), Some(Rect::new(10, 10, 30, 30)));
}

#[test]
fn escape_and_host_close_yield_nothing() {
    let mut escaped = ScriptedSurface::new(vec![
        SelectorEvent::PointerDown(Point::new(10, 10)),
        SelectorEvent::PointerMove(Point::new(90, 90)),
        SelectorEvent::Escape,
    ]);
    assert_eq!(select_region(&mut escaped, HOST), None);
    assert!(escaped.closed);

    let mut abandoned = ScriptedSurface::new(vec![SelectorEvent::PointerDown(Point::new(1, 1))]);
    assert_eq!(select_region(&mut abandoned, HOST), None);
    assert!(abandoned.closed);
}

#[test]
fn overlay_covers_the_capture_backend_extent() {
    let capturer = Capturer::new(Box::new(CheckerSource));
    let extent = capturer.virtual_bounds().unwrap();
    let mut surface = ScriptedSurface::new(vec![
        SelectorEvent::PointerDown(Point::new(-40, -30)),
        SelectorEvent::PointerMove(Point::new(20, 20)),
        SelectorEvent::PointerUp(Point::new(20, 20)),
    ]);

    let rect = select_region(&mut surface, extent).unwrap();

    assert_eq!(surface.opened, Some(Rect::new(-64, -64, 128, 128)));
    assert_eq!(surface.frames, vec![(128, 128)]);
    let buffer = capturer.capture(CaptureTarget::Region(rect)).unwrap();
    assert_eq!((buffer.width(), buffer.height()), (60, 50));
}
