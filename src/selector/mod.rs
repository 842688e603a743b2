//! Interactive region selection.
//!
//! `RegionSelector` is a plain state machine over pointer and key events:
//!
//! ```text
//! Idle --down--> Drawing --up (w > 5 && h > 5)--> Committed
//!   ^               |  \
//!   +---up (small)--+   +--escape--> Cancelled   (escape from Idle too)
//! ```
//!
//! The window that shows the overlay is supplied by the host through
//! `SelectionSurface`. `select_region` opens it over the virtual screen
//! reported by the capture backend, pumps its events into the state
//! machine and presents a freshly composited frame after every change.

pub mod overlay;

use crate::capture::PixelBuffer;
use crate::geometry::{Point, Rect};

pub use overlay::compose_overlay;

/// Both sides must exceed this many pixels for a drag to count.
pub const MIN_SELECTION: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp(Point),
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Idle,
    Drawing { anchor: Point, current: Point },
    Committed(Rect),
    Cancelled,
}

/// What a single event did, so the host knows whether to repaint or close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Ignored,
    Started,
    Updated(Rect),
    /// Gesture too small; back to Idle.
    Discarded(Rect),
    Committed(Rect),
    Cancelled,
}

impl Transition {
    pub fn needs_repaint(&self) -> bool {
        matches!(self, Transition::Updated(_) | Transition::Discarded(_))
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Transition::Committed(_) | Transition::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct RegionSelector {
    bounds: Rect,
    state: SelectorState,
}

impl RegionSelector {
    /// `bounds` is the virtual screen the overlay spans.
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            state: SelectorState::Idle,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    /// Rectangle currently being dragged, if any.
    pub fn live_rect(&self) -> Option<Rect> {
        match self.state {
            SelectorState::Drawing { anchor, current } => Some(Rect::from_corners(anchor, current)),
            _ => None,
        }
    }

    /// The selection, valid only once committed.
    pub fn committed(&self) -> Option<Rect> {
        match self.state {
            SelectorState::Committed(rect) => Some(rect),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            SelectorState::Committed(_) | SelectorState::Cancelled
        )
    }

    pub fn handle(&mut self, event: SelectorEvent) -> Transition {
        use SelectorEvent::*;

        let (next, transition) = match (self.state, event) {
            (SelectorState::Committed(_) | SelectorState::Cancelled, _) => {
                return Transition::Ignored;
            }
            (SelectorState::Idle | SelectorState::Drawing { .. }, Escape) => {
                (SelectorState::Cancelled, Transition::Cancelled)
            }
            (SelectorState::Idle, PointerDown(p)) => (
                SelectorState::Drawing {
                    anchor: p,
                    current: p,
                },
                Transition::Started,
            ),
            (SelectorState::Drawing { anchor, .. }, PointerMove(p)) => (
                SelectorState::Drawing { anchor, current: p },
                Transition::Updated(Rect::from_corners(anchor, p)),
            ),
            (SelectorState::Drawing { anchor, .. }, PointerUp(p)) => {
                let rect = Rect::from_corners(anchor, p);
                if rect.width > MIN_SELECTION && rect.height > MIN_SELECTION {
                    (SelectorState::Committed(rect), Transition::Committed(rect))
                } else {
                    log::debug!("[SELECTOR] Discarding {} (below minimum size)", rect);
                    (SelectorState::Idle, Transition::Discarded(rect))
                }
            }
            _ => return Transition::Ignored,
        };

        self.state = next;
        transition
    }

    /// Overlay frame for the current state.
    pub fn render(&self) -> PixelBuffer {
        compose_overlay(self.bounds, self.live_rect())
    }
}

/// Host-provided full-screen transparent window.
pub trait SelectionSurface {
    /// Shows the surface over `bounds` (virtual-screen coordinates).
    fn open(&mut self, bounds: Rect);

    /// Blocks for the next input event; `None` when the host closed the
    /// surface on its own.
    fn next_event(&mut self) -> Option<SelectorEvent>;

    fn present(&mut self, frame: &PixelBuffer);

    fn close(&mut self);
}

/// Runs one selection gesture on `surface` spanning `bounds`. Returns the
/// committed rectangle, or `None` when the user cancelled.
pub fn select_region(surface: &mut dyn SelectionSurface, bounds: Rect) -> Option<Rect> {
    let mut selector = RegionSelector::new(bounds);
    surface.open(bounds);
    log::info!("[SELECTOR] Selection surface opened over {}", bounds);

    while !selector.is_finished() {
        let Some(event) = surface.next_event() else {
            log::info!("[SELECTOR] Surface closed by host");
            break;
        };
        let transition = selector.handle(event);
        if transition.needs_repaint() {
            surface.present(&selector.render());
        }
    }

    surface.close();
    let result = selector.committed();
    match result {
        Some(rect) => log::info!("[SELECTOR] Committed {}", rect),
        None => log::info!("[SELECTOR] Selection cancelled"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Rect = Rect::new(0, 0, 1920, 1080);

    fn drag(selector: &mut RegionSelector, from: (i32, i32), to: (i32, i32)) -> Transition {
        selector.handle(SelectorEvent::PointerDown(Point::new(from.0, from.1)));
        selector.handle(SelectorEvent::PointerMove(Point::new(to.0, to.1)));
        selector.handle(SelectorEvent::PointerUp(Point::new(to.0, to.1)))
    }

    #[test]
    fn commit_normalizes_reverse_drag() {
        let mut selector = RegionSelector::new(SCREEN);
        let t = drag(&mut selector, (300, 400), (100, 150));
        assert_eq!(t, Transition::Committed(Rect::new(100, 150, 200, 250)));
        assert_eq!(selector.committed(), Some(Rect::new(100, 150, 200, 250)));
    }

    #[test]
    fn exactly_five_is_discarded() {
        let mut selector = RegionSelector::new(SCREEN);
        let t = drag(&mut selector, (10, 10), (15, 100));
        assert!(matches!(t, Transition::Discarded(_)));
        assert_eq!(selector.state(), SelectorState::Idle);
        assert_eq!(selector.committed(), None);
    }

    #[test]
    fn discard_allows_a_new_gesture() {
        let mut selector = RegionSelector::new(SCREEN);
        drag(&mut selector, (10, 10), (12, 12));
        let t = drag(&mut selector, (10, 10), (40, 40));
        assert_eq!(t, Transition::Committed(Rect::new(10, 10, 30, 30)));
    }

    #[test]
    fn escape_cancels_from_idle_and_drawing() {
        let mut idle = RegionSelector::new(SCREEN);
        assert_eq!(idle.handle(SelectorEvent::Escape), Transition::Cancelled);
        assert_eq!(idle.state(), SelectorState::Cancelled);

        let mut drawing = RegionSelector::new(SCREEN);
        drawing.handle(SelectorEvent::PointerDown(Point::new(5, 5)));
        assert_eq!(drawing.handle(SelectorEvent::Escape), Transition::Cancelled);
        assert_eq!(drawing.committed(), None);
    }

    #[test]
    fn events_after_commit_are_ignored() {
        let mut selector = RegionSelector::new(SCREEN);
        drag(&mut selector, (0, 0), (50, 50));
        assert_eq!(selector.handle(SelectorEvent::Escape), Transition::Ignored);
        assert_eq!(selector.committed(), Some(Rect::new(0, 0, 50, 50)));
    }

    #[test]
    fn move_without_press_is_ignored() {
        let mut selector = RegionSelector::new(SCREEN);
        let t = selector.handle(SelectorEvent::PointerMove(Point::new(5, 5)));
        assert_eq!(t, Transition::Ignored);
        assert_eq!(selector.live_rect(), None);
    }

    #[test]
    fn live_rect_tracks_pointer() {
        let mut selector = RegionSelector::new(SCREEN);
        selector.handle(SelectorEvent::PointerDown(Point::new(100, 100)));
        selector.handle(SelectorEvent::PointerMove(Point::new(80, 130)));
        assert_eq!(selector.live_rect(), Some(Rect::new(80, 100, 20, 30)));
    }
}
