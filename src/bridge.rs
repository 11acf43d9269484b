//! Main loop orchestration
//!
//! [`Bridge::poll`] is one iteration of the cooperative main loop:
//!
//! 1. drain the USB host's events, routing HID reports to the keyboard and
//!    mouse pipelines and tracking attached devices
//! 2. serve the keyboard bus
//! 3. serve the serial port according to the current [`PortMode`]
//!
//! Every step runs to completion in the caller's context. A storage read
//! or a keyboard transfer delays everything after it.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::hid::{HidProtocol, KeyboardReport, MouseEventAggregator, MouseReport};
use crate::keyboard::{KeyboardBus, KeyboardPoll, ScancodeTranslator};
use crate::serial::{PortMode, SerialChannel, SerialMouse, SerialStorage, StoragePoll, UartPort};
use crate::usb::{BlockDevice, HidSlot, StorageSlot, UsbEvent, UsbHost};

/// The USB-to-legacy bridge
///
/// Owns the adapters and the device slots; borrows the serial channel,
/// which lives in a `static` shared with the serial interrupt.
pub struct Bridge<'a, K, P, U, D, S, const TX: usize, const RX: usize> {
    serial: &'a SerialChannel<U, TX, RX>,
    keyboard: K,
    mouse: SerialMouse<P>,
    storage: SerialStorage,
    delay: D,
    mode: PortMode,
    mouse_events: MouseEventAggregator,
    scancodes: ScancodeTranslator,
    held_report: Option<KeyboardReport>,
    keyboard_slot: HidSlot,
    mouse_slot: HidSlot,
    disk: StorageSlot<S>,
}

impl<'a, K, P, U, D, S, const TX: usize, const RX: usize> Bridge<'a, K, P, U, D, S, TX, RX>
where
    K: KeyboardBus,
    P: InputPin,
    U: UartPort,
    D: DelayNs,
    S: BlockDevice,
{
    /// Assemble the bridge
    ///
    /// `serial` must already have its UART installed in the mouse format;
    /// `dtr` is the serial port's DTR input.
    pub fn new(
        config: &BridgeConfig,
        serial: &'a SerialChannel<U, TX, RX>,
        keyboard: K,
        dtr: P,
        delay: D,
    ) -> Self {
        Self {
            serial,
            keyboard,
            mouse: SerialMouse::new(dtr, config.mouse_format),
            storage: SerialStorage::new(config),
            delay,
            mode: PortMode::MouseHandshake,
            mouse_events: MouseEventAggregator::new(),
            scancodes: ScancodeTranslator::new(),
            held_report: None,
            keyboard_slot: HidSlot::Absent,
            mouse_slot: HidSlot::Absent,
            disk: StorageSlot::Absent,
        }
    }

    /// Protocol currently owning the serial port
    pub fn mode(&self) -> PortMode {
        self.mode
    }

    /// Keyboard bus device
    pub fn keyboard(&self) -> &K {
        &self.keyboard
    }

    /// Attached boot keyboard
    pub fn keyboard_slot(&self) -> HidSlot {
        self.keyboard_slot
    }

    /// Attached boot mouse
    pub fn mouse_slot(&self) -> HidSlot {
        self.mouse_slot
    }

    /// Attached mass-storage device
    pub fn disk(&self) -> &StorageSlot<S> {
        &self.disk
    }

    /// Pointer motion not yet sent to the host
    pub fn mouse_events(&self) -> &MouseEventAggregator {
        &self.mouse_events
    }

    /// Run one main loop iteration
    ///
    /// Only serial channel errors abort the iteration; keyboard and storage
    /// problems are logged and the loop carries on.
    pub fn poll<H: UsbHost<Storage = S>>(&mut self, usb: &mut H) -> Result<()> {
        while let Some(event) = usb.poll_event() {
            self.handle_event(event);
        }
        if let Some(report) = self.held_report.take() {
            self.queue_keys(report);
        }

        match self.keyboard.poll() {
            Ok(KeyboardPoll::Aborted { sent: _sent }) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("keyboard: inhibited after {} bytes", _sent);
            }
            Ok(_) => {}
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("keyboard: {}", _e);
            }
        }

        match self.mode {
            PortMode::MouseHandshake => {
                self.mouse.poll(self.serial, &mut self.mouse_events)?;
                if self.storage.poll_handshake(self.serial, &mut self.delay)?
                    == StoragePoll::SwitchedToStorage
                {
                    self.mode = PortMode::Storage;
                }
            }
            PortMode::Storage => {
                self.storage.poll(self.serial, &mut self.disk, &mut self.delay)?;
            }
        }
        Ok(())
    }

    /// Route a single USB host event
    pub fn handle_event(&mut self, event: UsbEvent<S>) {
        match event {
            UsbEvent::HidMounted { address, instance, protocol } => {
                let slot = HidSlot::Attached { address, instance };
                match protocol {
                    HidProtocol::Keyboard => {
                        #[cfg(feature = "defmt")]
                        defmt::info!("hid: keyboard at {}:{}", address, instance);
                        self.keyboard_slot = slot;
                        self.scancodes.reset();
                        self.held_report = None;
                    }
                    HidProtocol::Mouse => {
                        #[cfg(feature = "defmt")]
                        defmt::info!("hid: mouse at {}:{}", address, instance);
                        self.mouse_slot = slot;
                    }
                    _other => {
                        #[cfg(feature = "defmt")]
                        defmt::info!("hid: ignoring {}:{} ({})", address, instance, _other);
                    }
                }
            }
            UsbEvent::HidUnmounted { address, instance } => {
                if self.keyboard_slot.is(address, instance) {
                    self.keyboard_slot = HidSlot::Absent;
                    self.scancodes.reset();
                    self.held_report = None;
                } else if self.mouse_slot.is(address, instance) {
                    self.mouse_slot = HidSlot::Absent;
                } else {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("hid: unmount of unknown device {}:{}", address, instance);
                }
            }
            UsbEvent::HidReport { address, instance, report } => {
                if self.keyboard_slot.is(address, instance) {
                    self.keyboard_report(&report);
                } else if self.mouse_slot.is(address, instance) {
                    match MouseReport::parse(&report) {
                        Ok(report) => self.mouse_events.on_report(report.to_event()),
                        Err(_e) => {
                            #[cfg(feature = "defmt")]
                            defmt::warn!("hid: mouse report: {}", _e);
                        }
                    }
                }
            }
            UsbEvent::StorageMounted(device) => {
                // Rejection is logged by the slot
                let _ = self.disk.attach(device);
            }
            UsbEvent::StorageUnmounted { address } => {
                if self.disk.detach(address).is_none() {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("umass: unmount of unknown device {}", address);
                }
            }
        }
    }

    fn keyboard_report(&mut self, raw: &[u8]) {
        let report = match KeyboardReport::parse(raw) {
            Ok(report) => report,
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("hid: keyboard report: {}", _e);
                return;
            }
        };
        self.queue_keys(report);
    }

    /// Queue the scan codes for `report`, or hold it for the next poll
    ///
    /// The translator only moves on once the whole sequence is queued, so a
    /// release rejected by a full queue is sent later instead of lost. A
    /// newer report replaces a held one; the diff covers both.
    fn queue_keys(&mut self, report: KeyboardReport) {
        let sequence = self.scancodes.diff(&report);
        if sequence.is_empty() || self.keyboard.queue_bytes(&sequence).is_ok() {
            self.scancodes.commit(&report);
            self.held_report = None;
        } else {
            #[cfg(feature = "defmt")]
            defmt::debug!("keyboard: holding report until the queue drains");
            self.held_report = Some(report);
        }
    }
}
