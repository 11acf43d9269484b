//! Keyboard bus instrumentation hooks

use embedded_hal::digital::OutputPin;

/// Points in the keyboard state machine reported to a [`BusObserver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusTransition {
    /// Host pulled clock and data low
    HostRequest,
    /// Host command clocked in
    CommandReceived(u8),
    /// Host command had a bad parity bit
    ParityError(u8),
    /// Reply bytes placed on the outbound queue
    ReplyQueued,
    /// Byte clocked out to the host
    FrameSent(u8),
    /// Send of this byte stopped because the host held clock low
    SendAborted(u8),
}

/// Receives [`BusTransition`]s from the keyboard adapter
///
/// `()` is the default, no-op observer.
pub trait BusObserver {
    /// Called at each transition
    fn on_transition(&mut self, transition: BusTransition);
}

impl BusObserver for () {
    #[inline(always)]
    fn on_transition(&mut self, _transition: BusTransition) {}
}

/// Toggles a GPIO at every transition, for a logic analyzer
pub struct DebugPinObserver<P> {
    pin: P,
    high: bool,
}

impl<P: OutputPin> DebugPinObserver<P> {
    /// Wrap a pin, driving it low
    pub fn new(mut pin: P) -> Self {
        let _ = pin.set_low();
        Self { pin, high: false }
    }

    /// Give the pin back
    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> BusObserver for DebugPinObserver<P> {
    fn on_transition(&mut self, _transition: BusTransition) {
        self.high = !self.high;
        // Instrumentation only; a failed toggle is not worth reporting
        let _ = self.pin.set_state(self.high.into());
    }
}
