//! Mock hardware for host-side tests
//!
//! - [`MockUart`]: serial port with a one-byte transmit holding register
//! - [`KeyboardHost`]: the PC end of the keyboard bus, simulating the
//!   wired-AND clock and data lines
//! - [`StubDisk`] / [`MockUsbHost`]: USB collaborators
//! - [`MockDelay`] / [`MockDtr`]: timing and the DTR line

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use retro_usb_bridge::config::BLOCK_SIZE;
use retro_usb_bridge::keyboard::KeyboardPins;
use retro_usb_bridge::serial::{SerialChannel, SerialFormat, UartPort};
use retro_usb_bridge::usb::{BlockDevice, Capacity, UsbEvent, UsbHost};
use retro_usb_bridge::{BridgeError, Result};

// ---------------------------------------------------------------------------
// Serial

/// Everything the mock UART saw
#[derive(Debug, Default)]
pub struct UartState {
    /// Bytes the "host PC" sent, waiting in the receiver
    pub incoming: VecDeque<u8>,
    /// Every byte put on the wire, interrupt-driven or blocking
    pub wire: Vec<u8>,
    /// Bytes written through `write_blocking`
    pub blocking: Vec<u8>,
    /// Formats applied, in order
    pub formats: Vec<SerialFormat>,
    /// Transmit holding register occupied
    pub busy: bool,
    /// Transmit interrupt enabled
    pub tx_irq: bool,
    /// Receive interrupt enabled
    pub rx_irq: bool,
}

/// Serial port handle; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockUart(pub Rc<RefCell<UartState>>);

impl MockUart {
    /// Queue bytes as if the host PC had sent them
    pub fn feed(&self, bytes: &[u8]) {
        self.0.borrow_mut().incoming.extend(bytes.iter().copied());
    }

    /// Bytes transmitted so far
    pub fn wire(&self) -> Vec<u8> {
        self.0.borrow().wire.clone()
    }

    /// Forget transmitted bytes
    pub fn clear_wire(&self) {
        self.0.borrow_mut().wire.clear();
    }

    /// Formats applied so far
    pub fn formats(&self) -> Vec<SerialFormat> {
        self.0.borrow().formats.clone()
    }
}

impl UartPort for MockUart {
    fn configure(&mut self, format: SerialFormat) {
        self.0.borrow_mut().formats.push(format);
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.0.borrow_mut().incoming.pop_front()
    }

    fn is_writable(&self) -> bool {
        !self.0.borrow().busy
    }

    fn write_byte(&mut self, byte: u8) {
        let mut state = self.0.borrow_mut();
        assert!(!state.busy, "write into a full holding register");
        state.busy = true;
        state.wire.push(byte);
    }

    fn write_blocking(&mut self, bytes: &[u8]) {
        let mut state = self.0.borrow_mut();
        state.wire.extend_from_slice(bytes);
        state.blocking.extend_from_slice(bytes);
    }

    fn set_rx_interrupt(&mut self, enabled: bool) {
        self.0.borrow_mut().rx_irq = enabled;
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        self.0.borrow_mut().tx_irq = enabled;
    }
}

/// Channel with a fresh mock UART installed
pub fn serial_channel(format: SerialFormat) -> (SerialChannel<MockUart>, MockUart) {
    let uart = MockUart::default();
    let channel = SerialChannel::new();
    channel.install(uart.clone(), format).unwrap();
    (channel, uart)
}

/// Fire the serial interrupt until the line is quiet: the transmit FIFO
/// drained and every incoming byte received
pub fn run_interrupts(channel: &SerialChannel<MockUart>, uart: &MockUart) {
    loop {
        let pending = {
            let mut state = uart.0.borrow_mut();
            // previous byte has left the shift register
            state.busy = false;
            state.tx_irq || (state.rx_irq && !state.incoming.is_empty())
        };
        if !pending {
            break;
        }
        channel.on_interrupt();
    }
}

// ---------------------------------------------------------------------------
// Keyboard bus

/// Odd parity as the host computes it
pub fn parity_bit(byte: u8) -> bool {
    byte.count_ones() % 2 == 0
}

#[derive(Debug)]
struct HostFrame {
    bits: [bool; 11],
    index: usize,
}

/// Both ends of the keyboard bus
#[derive(Debug, Default)]
pub struct BusState {
    device_clock_low: bool,
    device_data_low: bool,
    host_clock_low: bool,
    host_data_low: bool,
    /// Clock reads left before the host lets go of clock after a request
    release_countdown: u32,
    host_frame: Option<HostFrame>,
    /// Device pulled data low during the ack clock pulse
    pub ack_seen: bool,
    /// Falling clock edges generated by the device
    pub clock_pulses: u32,
    frame_bits: Vec<bool>,
    /// Complete frames received from the device
    pub received: Vec<u8>,
    /// Received frames with a bad start, parity or stop bit
    pub framing_errors: u32,
    inhibit_after: Option<usize>,
}

impl BusState {
    fn clock_low(&self) -> bool {
        self.device_clock_low || self.host_clock_low
    }

    fn data_low(&self) -> bool {
        self.device_data_low || self.host_data_low
    }

    fn clock_fell(&mut self) {
        self.clock_pulses += 1;
        if let Some(frame) = &self.host_frame {
            if frame.index == 10 && self.device_data_low {
                self.ack_seen = true;
            }
            return;
        }

        let bit = !self.data_low();
        self.frame_bits.push(bit);
        if self.frame_bits.len() == 11 {
            self.finish_frame();
        }
        if let Some(n) = self.inhibit_after.as_mut() {
            *n -= 1;
            if *n == 0 {
                // the partial frame is discarded by the host
                self.inhibit_after = None;
                self.host_clock_low = true;
                self.frame_bits.clear();
            }
        }
    }

    fn clock_rose(&mut self) {
        let Some(frame) = self.host_frame.as_mut() else {
            return;
        };
        frame.index += 1;
        if frame.index >= 11 {
            self.host_frame = None;
            self.host_data_low = false;
        } else {
            self.host_data_low = !frame.bits[frame.index];
        }
    }

    fn finish_frame(&mut self) {
        let bits = core::mem::take(&mut self.frame_bits);
        let byte = bits[1..9]
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &b)| acc | ((b as u8) << i));
        if bits[0] || !bits[10] || bits[9] != parity_bit(byte) {
            self.framing_errors += 1;
        }
        self.received.push(byte);
    }
}

#[derive(Debug, Clone, Copy)]
enum Line {
    ClockOut,
    DataOut,
    ClockIn,
    DataIn,
}

/// One keyboard bus GPIO
#[derive(Debug, Clone)]
pub struct BusPin {
    bus: Rc<RefCell<BusState>>,
    line: Line,
}

impl ErrorType for BusPin {
    type Error = Infallible;
}

impl OutputPin for BusPin {
    fn set_low(&mut self) -> core::result::Result<(), Infallible> {
        let mut bus = self.bus.borrow_mut();
        match self.line {
            Line::ClockOut => {
                if !bus.device_clock_low {
                    bus.device_clock_low = true;
                    bus.clock_fell();
                }
            }
            Line::DataOut => bus.device_data_low = true,
            _ => panic!("input pin driven"),
        }
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Infallible> {
        let mut bus = self.bus.borrow_mut();
        match self.line {
            Line::ClockOut => {
                if bus.device_clock_low {
                    bus.device_clock_low = false;
                    bus.clock_rose();
                }
            }
            Line::DataOut => bus.device_data_low = false,
            _ => panic!("input pin driven"),
        }
        Ok(())
    }
}

impl InputPin for BusPin {
    fn is_high(&mut self) -> core::result::Result<bool, Infallible> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&mut self) -> core::result::Result<bool, Infallible> {
        let mut bus = self.bus.borrow_mut();
        match self.line {
            Line::ClockIn => {
                if bus.release_countdown > 0 {
                    bus.release_countdown -= 1;
                    if bus.release_countdown == 0 {
                        bus.host_clock_low = false;
                    }
                }
                Ok(bus.clock_low())
            }
            Line::DataIn => Ok(bus.data_low()),
            _ => panic!("output pin read"),
        }
    }
}

/// The PC side of the keyboard bus
#[derive(Debug, Clone, Default)]
pub struct KeyboardHost(pub Rc<RefCell<BusState>>);

impl KeyboardHost {
    /// Pins for the device end
    pub fn pins(&self) -> KeyboardPins<BusPin, BusPin, BusPin, BusPin> {
        let pin = |line| BusPin { bus: self.0.clone(), line };
        KeyboardPins {
            clock_out: pin(Line::ClockOut),
            data_out: pin(Line::DataOut),
            clock_in: pin(Line::ClockIn),
            data_in: pin(Line::DataIn),
        }
    }

    /// Start a host-to-device transfer of `byte`
    pub fn send(&self, byte: u8) {
        self.send_with_parity(byte, parity_bit(byte));
    }

    /// Start a host-to-device transfer with an explicit parity bit
    pub fn send_with_parity(&self, byte: u8, parity: bool) {
        let mut bits = [false; 11];
        for (i, bit) in bits[1..9].iter_mut().enumerate() {
            *bit = byte & (1 << i) != 0;
        }
        bits[9] = parity;
        bits[10] = true;

        let mut bus = self.0.borrow_mut();
        bus.ack_seen = false;
        bus.host_clock_low = true;
        bus.host_data_low = true;
        // one read for the idle check, released on the next
        bus.release_countdown = 2;
        bus.host_frame = Some(HostFrame { bits, index: 0 });
    }

    /// Check if the host transfer finished, acknowledged by the device
    pub fn transfer_acked(&self) -> bool {
        let bus = self.0.borrow();
        bus.host_frame.is_none() && bus.ack_seen
    }

    /// Hold clock low, inhibiting the device
    pub fn inhibit(&self) {
        self.0.borrow_mut().host_clock_low = true;
    }

    /// Inhibit once the device has clocked out `bits` more bits
    pub fn inhibit_after(&self, bits: usize) {
        self.0.borrow_mut().inhibit_after = Some(bits);
    }

    /// Release clock
    pub fn release(&self) {
        self.0.borrow_mut().host_clock_low = false;
    }

    /// Frames received from the device so far
    pub fn received(&self) -> Vec<u8> {
        self.0.borrow().received.clone()
    }

    /// Framing errors seen so far
    pub fn framing_errors(&self) -> u32 {
        self.0.borrow().framing_errors
    }

    /// Check if the device left both lines released
    pub fn device_released(&self) -> bool {
        let bus = self.0.borrow();
        !bus.device_clock_low && !bus.device_data_low
    }
}

// ---------------------------------------------------------------------------
// Timing and DTR

/// Delay that returns at once and accumulates the requested time
#[derive(Debug, Clone, Default)]
pub struct MockDelay(pub Rc<Cell<u64>>);

impl MockDelay {
    /// Total requested delay in microseconds
    pub fn elapsed_us(&self) -> u64 {
        self.0.get() / 1_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + ns as u64);
    }
}

/// DTR input under test control
#[derive(Debug, Clone)]
pub struct MockDtr(pub Rc<Cell<bool>>);

impl MockDtr {
    /// DTR starting high
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    /// Drive the line
    pub fn set(&self, high: bool) {
        self.0.set(high);
    }
}

impl ErrorType for MockDtr {
    type Error = Infallible;
}

impl InputPin for MockDtr {
    fn is_high(&mut self) -> core::result::Result<bool, Infallible> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> core::result::Result<bool, Infallible> {
        Ok(!self.0.get())
    }
}

// ---------------------------------------------------------------------------
// USB

/// Byte `i` of block `lba` as served by [`StubDisk`]
pub fn disk_pattern(lba: u32, i: usize) -> u8 {
    (lba as usize).wrapping_mul(31).wrapping_add(i) as u8
}

/// Mass-storage device serving [`disk_pattern`]
#[derive(Debug, Clone)]
pub struct StubDisk {
    /// USB address
    pub address: u8,
    /// Reported block size
    pub block_size: u32,
    /// Fail every read
    pub fail: bool,
    /// LBAs read so far
    pub reads: Rc<RefCell<Vec<u32>>>,
}

impl StubDisk {
    /// Healthy 512-byte-block disk
    pub fn new(address: u8) -> Self {
        Self {
            address,
            block_size: BLOCK_SIZE as u32,
            fail: false,
            reads: Rc::default(),
        }
    }
}

impl BlockDevice for StubDisk {
    fn address(&self) -> u8 {
        self.address
    }

    fn capacity(&self) -> Capacity {
        Capacity {
            block_count: 1 << 20,
            block_size: self.block_size,
        }
    }

    fn read_block(&mut self, lba: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        self.reads.borrow_mut().push(lba);
        if self.fail {
            return Err(BridgeError::StorageRead);
        }
        for (i, b) in buf.iter_mut().enumerate() {
            *b = disk_pattern(lba, i);
        }
        Ok(())
    }
}

/// USB host stack replaying queued events
#[derive(Debug, Default)]
pub struct MockUsbHost {
    /// Events returned by the next polls
    pub events: VecDeque<UsbEvent<StubDisk>>,
}

impl MockUsbHost {
    /// Queue an event
    pub fn push(&mut self, event: UsbEvent<StubDisk>) {
        self.events.push_back(event);
    }

    /// Queue an input report
    pub fn report(&mut self, address: u8, instance: u8, bytes: &[u8]) {
        let report = heapless::Vec::from_slice(bytes).unwrap();
        self.push(UsbEvent::HidReport { address, instance, report });
    }
}

impl UsbHost for MockUsbHost {
    type Storage = StubDisk;

    fn poll_event(&mut self) -> Option<UsbEvent<StubDisk>> {
        self.events.pop_front()
    }
}
