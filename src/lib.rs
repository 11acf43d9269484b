#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

//! USB-to-legacy input and storage bridge
//!
//! Lets a vintage PC use modern USB peripherals. A USB host stack on the
//! microcontroller enumerates keyboards, mice and mass-storage devices; this
//! crate turns what they produce into the three legacy interfaces the PC
//! understands:
//!
//! - an AT/PS/2 keyboard on bit-banged GPIOs ([`keyboard`])
//! - a Microsoft 3-button serial mouse on a UART ([`serial::mouse`])
//! - a raw sector relay sharing the same UART after a magic handshake
//!   ([`serial::storage`])
//!
//! # Core Components
//!
//! - [`bridge`] - main loop iteration routing USB events to the adapters
//! - [`fifo`] - fixed-capacity byte ring used between interrupt and main loop
//! - [`serial`] - interrupt-driven serial channel and its two protocols
//! - [`keyboard`] - keyboard bus state machine and scan code translation
//! - [`hid`] - boot protocol report parsing and mouse event coalescing
//! - [`usb`] - interface to the USB host stack
//! - [`config`] - protocol constants and [`BridgeConfig`]
//! - [`error`] - error types
//!
//! # Hardware Access
//!
//! Pins and delays come from `embedded-hal` 1.0 traits; the UART is reached
//! through [`serial::UartPort`]. Interrupt/main-loop exclusion uses
//! `critical-section`, which on Cortex-M single-core targets is provided by
//! `cortex-m`.

#[cfg(all(target_arch = "arm", target_os = "none"))]
use cortex_m as _;
#[cfg(feature = "defmt")]
use defmt as _;

pub mod bridge;
pub mod config;
pub mod error;
pub mod fifo;
pub mod hid;
pub mod keyboard;
pub mod serial;
pub mod usb;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use fifo::RingFifo;
pub use keyboard::{KeyboardBus, KeyboardPins, KeyboardPoll, LegacyKeyboard};
pub use serial::{PortMode, SerialChannel, SerialFormat, UartPort};
pub use usb::{BlockDevice, UsbEvent, UsbHost};
