//! Render targets and redraw scheduling.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct SurfaceState {
    width: u32,
    height: u32,
    content: String,
    presentations: u64,
}

/// A drawable surface mounted by the host.
///
/// Cloning a surface produces another handle to the same drawable, so the
/// host and the runtime view can share it.
#[derive(Debug, Clone, Default)]
pub struct Surface(Rc<RefCell<SurfaceState>>);

impl Surface {
    /// Constructor.
    pub fn new(width: u32, height: u32) -> Self {
        Self(Rc::new(RefCell::new(SurfaceState {
            width,
            height,
            ..Default::default()
        })))
    }

    /// The current size of the surface as `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        let state = self.0.borrow();
        (state.width, state.height)
    }

    /// Changes the size of the surface. Does not redraw its content; that is
    /// up to whoever is notified of the resize.
    pub fn set_size(&self, width: u32, height: u32) {
        let mut state = self.0.borrow_mut();
        state.width = width;
        state.height = height;
    }

    /// Replaces the content of the surface.
    pub fn present(&self, content: String) {
        let mut state = self.0.borrow_mut();
        state.content = content;
        state.presentations += 1;
    }

    /// Removes all content from the surface.
    pub fn clear(&self) {
        self.0.borrow_mut().content.clear();
    }

    /// A copy of the surface's current content.
    pub fn content(&self) -> String {
        self.0.borrow().content.clone()
    }

    /// How many times content has been presented on this surface.
    pub fn presentations(&self) -> u64 {
        self.0.borrow().presentations
    }
}

/// Receives requests for a full repaint of the host.
pub trait RedrawScheduler {
    fn schedule_full_redraw(&self);
}

impl RedrawScheduler for Notify {
    fn schedule_full_redraw(&self) {
        self.notify_one();
    }
}

/// Counts redraw requests.
#[derive(Debug, Default)]
pub struct RedrawCounter(Cell<u64>);

impl RedrawCounter {
    pub fn count(&self) -> u64 {
        self.0.get()
    }
}

impl RedrawScheduler for RedrawCounter {
    fn schedule_full_redraw(&self) {
        self.0.set(self.0.get() + 1);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clones_share_the_drawable() {
        let surface = Surface::new(10, 20);
        let other = surface.clone();
        other.present("<svg/>".to_string());
        other.set_size(30, 40);
        assert_eq!(surface.content(), "<svg/>");
        assert_eq!(surface.size(), (30, 40));
        assert_eq!(surface.presentations(), 1);

        surface.clear();
        assert!(other.content().is_empty());
    }

    #[test]
    fn counter_counts() {
        let counter = RedrawCounter::default();
        counter.schedule_full_redraw();
        counter.schedule_full_redraw();
        assert_eq!(counter.count(), 2);
    }
}
