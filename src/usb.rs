//! USB host collaborator interface
//!
//! The bridge does not run USB transactions itself. A host stack (EHCI
//! driver, TinyUSB binding, ...) drives enumeration and transfers and hands
//! the bridge what it cares about through [`UsbHost::poll_event`]:
//!
//! - HID mount/unmount with the interface's boot protocol
//! - HID input reports
//! - mass-storage mount/unmount, carrying a [`BlockDevice`] handle
//!
//! Attached devices are tracked in tagged slots ([`HidSlot`],
//! [`StorageSlot`]) rather than nullable globals.

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;

use crate::config::BLOCK_SIZE;
use crate::error::{BridgeError, Result};
use crate::hid::HidProtocol;

/// Largest HID report payload the bridge keeps (boot keyboard = 8 bytes)
pub const MAX_REPORT_LEN: usize = 8;

/// Size of a mass-storage device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capacity {
    /// Number of addressable blocks
    pub block_count: u32,
    /// Bytes per block
    pub block_size: u32,
}

/// Raw block access to a mounted mass-storage LUN
pub trait BlockDevice {
    /// USB device address
    fn address(&self) -> u8;

    /// Block count and size as reported by READ CAPACITY
    fn capacity(&self) -> Capacity;

    /// Read one block
    ///
    /// Stalls the caller until the transfer has completed or failed. On a
    /// callback-driven host stack the implementation submits the read and
    /// spins the host task until its completion callback fires, see
    /// [`CompletionFlag::block_on`].
    fn read_block(&mut self, lba: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()>;
}

/// Event delivered by the USB host stack
#[derive(Debug)]
pub enum UsbEvent<D> {
    /// HID interface mounted
    HidMounted {
        /// Device address
        address: u8,
        /// Interface instance
        instance: u8,
        /// Interface boot protocol
        protocol: HidProtocol,
    },
    /// HID interface removed
    HidUnmounted {
        /// Device address
        address: u8,
        /// Interface instance
        instance: u8,
    },
    /// Input report received on a HID interface
    HidReport {
        /// Device address
        address: u8,
        /// Interface instance
        instance: u8,
        /// Report payload, truncated to [`MAX_REPORT_LEN`]
        report: Vec<u8, MAX_REPORT_LEN>,
    },
    /// Mass-storage device mounted and its capacity read
    StorageMounted(D),
    /// Mass-storage device removed
    StorageUnmounted {
        /// Device address
        address: u8,
    },
}

/// USB host stack as seen by the bridge
pub trait UsbHost {
    /// Block device handle handed out on mass-storage mount
    type Storage: BlockDevice;

    /// Run the host task and return the next pending event
    fn poll_event(&mut self) -> Option<UsbEvent<Self::Storage>>;
}

/// A HID interface slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidSlot {
    /// Nothing attached
    #[default]
    Absent,
    /// Interface at this address/instance is attached
    Attached {
        /// Device address
        address: u8,
        /// Interface instance
        instance: u8,
    },
}

impl HidSlot {
    /// Check if the slot holds this interface
    pub fn is(&self, address: u8, instance: u8) -> bool {
        matches!(*self, Self::Attached { address: a, instance: i } if a == address && i == instance)
    }
}

/// The mass-storage slot
#[derive(Debug)]
pub enum StorageSlot<D> {
    /// Nothing attached
    Absent,
    /// Device accepted at mount time
    Attached(D),
}

impl<D: BlockDevice> StorageSlot<D> {
    /// Accept a newly mounted device
    ///
    /// Devices whose block size is not exactly [`BLOCK_SIZE`] are rejected
    /// and the slot keeps its previous content.
    pub fn attach(&mut self, device: D) -> Result<()> {
        let capacity = device.capacity();
        if capacity.block_size as usize != BLOCK_SIZE {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "umass: address {} has {} byte blocks, ignoring",
                device.address(),
                capacity.block_size
            );
            return Err(BridgeError::UnsupportedBlockSize);
        }

        #[cfg(feature = "defmt")]
        defmt::info!(
            "umass: address {} mounted, {} blocks",
            device.address(),
            capacity.block_count
        );

        *self = Self::Attached(device);
        Ok(())
    }

    /// Drop the device if it lives at `address`
    pub fn detach(&mut self, address: u8) -> Option<D> {
        if !matches!(self, Self::Attached(device) if device.address() == address) {
            return None;
        }
        match core::mem::replace(self, Self::Absent) {
            Self::Attached(device) => Some(device),
            Self::Absent => None,
        }
    }

    /// Check if a device is attached
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Attached(_))
    }

    /// The attached device
    pub fn device_mut(&mut self) -> Result<&mut D> {
        match self {
            Self::Attached(device) => Ok(device),
            Self::Absent => Err(BridgeError::NoStorageDevice),
        }
    }
}

impl<D> Default for StorageSlot<D> {
    fn default() -> Self {
        Self::Absent
    }
}

/// Done flag for an asynchronous USB transfer
///
/// The host stack's completion callback calls [`signal`](Self::signal);
/// the submitting side waits in [`block_on`](Self::block_on), pumping the
/// host task so the transfer can progress.
#[derive(Debug, Default)]
pub struct CompletionFlag {
    done: AtomicBool,
    failed: AtomicBool,
}

impl CompletionFlag {
    /// Create a cleared flag
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    /// Clear the flag before submitting a transfer
    pub fn arm(&self) {
        self.failed.store(false, Ordering::Relaxed);
        self.done.store(false, Ordering::Release);
    }

    /// Mark the transfer finished (called from the completion callback)
    pub fn signal(&self, success: bool) {
        self.failed.store(!success, Ordering::Relaxed);
        self.done.store(true, Ordering::Release);
    }

    /// Check if the transfer has finished
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Spin `pump` until the flag is signalled
    ///
    /// There is no timeout: the caller and everything scheduled after it in
    /// the main loop stall until the host stack reports completion.
    pub fn block_on(&self, mut pump: impl FnMut()) -> Result<()> {
        while !self.is_done() {
            pump();
        }
        if self.failed.load(Ordering::Relaxed) {
            Err(BridgeError::StorageRead)
        } else {
            Ok(())
        }
    }
}
