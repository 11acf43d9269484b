//! Pointer report coalescing
//!
//! USB mice report far more often than a 1200 baud serial line can carry.
//! Reports arriving between two serial polls are folded into one pending
//! event.

use super::mouse::MouseButtons;

/// Accumulated pointer motion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MouseEvent {
    /// Horizontal motion, positive is right
    pub dx: i32,
    /// Vertical motion, positive is down
    pub dy: i32,
    /// Buttons held
    pub buttons: MouseButtons,
}

/// Holds at most one pending [`MouseEvent`]
///
/// Merging sums the deltas and replaces the button set with the one from
/// the newest report, so a press and release inside one window is lost.
#[derive(Debug, Default)]
pub struct MouseEventAggregator {
    pending: Option<MouseEvent>,
}

impl MouseEventAggregator {
    /// Create an aggregator with nothing pending
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Fold a new report into the pending event
    pub fn on_report(&mut self, event: MouseEvent) {
        match self.pending.as_mut() {
            None => self.pending = Some(event),
            Some(pending) => {
                pending.dx = pending.dx.saturating_add(event.dx);
                pending.dy = pending.dy.saturating_add(event.dy);
                pending.buttons = event.buttons;
            }
        }
    }

    /// Take the pending event, leaving nothing pending
    pub fn take_pending(&mut self) -> Option<MouseEvent> {
        self.pending.take()
    }

    /// Check if an event is waiting
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
