//! Serial sector relay
//!
//! Lets the legacy host read raw 512-byte sectors from a USB mass-storage
//! device over the serial port that otherwise carries the mouse.
//!
//! # Protocol
//!
//! | Direction | Bytes | Meaning |
//! |-----------|-------|---------|
//! | host → bridge | `*` `^` | switch to storage mode (1200 7N1 → 115200 8N1) |
//! | bridge → host | `K` `O` | acknowledgment, sent before the switch |
//! | host → bridge | `R` + 4 bytes BE | read sector |
//! | bridge → host | 512 bytes + 2 bytes BE | sector payload + CRC16/XMODEM |
//!
//! Requests are only acted on once the complete request is buffered. A
//! partial prefix stays in the receive FIFO until more bytes arrive; bytes
//! that can no longer start a valid command are dropped one at a time.

use embedded_hal::delay::DelayNs;

use crate::config::{
    BridgeConfig, BLOCK_SIZE, STORAGE_ACK, STORAGE_MAGIC, STORAGE_READ_COMMAND,
    STORAGE_REQUEST_LEN, STORAGE_RESPONSE_LEN,
};
use crate::error::Result;
use crate::fifo::RingFifo;
use crate::usb::{BlockDevice, StorageSlot};
use super::{SerialChannel, SerialFormat, UartPort};

/// Fold one byte into a CRC16/XMODEM (poly 0x1021, MSB first, no reflection)
#[inline]
pub fn crc16_xmodem_update(mut crc: u16, byte: u8) -> u16 {
    crc ^= (byte as u16) << 8;
    for _ in 0..8 {
        if (crc & 0x8000) != 0 {
            crc = (crc << 1) ^ 0x1021;
        } else {
            crc <<= 1;
        }
    }
    crc
}

/// CRC16/XMODEM over `bytes`, initial value 0
pub fn crc16_xmodem(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0, |crc, &b| crc16_xmodem_update(crc, b))
}

/// What a [`SerialStorage`] poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoragePoll {
    /// No complete request buffered
    Idle,
    /// Magic sequence seen, port switched to the storage format
    SwitchedToStorage,
    /// Sector sent (absolute LBA after the partition offset)
    SectorSent(u32),
    /// Request consumed without a response
    Dropped(u32),
}

/// Sector relay adapter
pub struct SerialStorage {
    format: SerialFormat,
    partition_offset: u32,
    settle_ms: u32,
    block: [u8; BLOCK_SIZE],
}

impl SerialStorage {
    /// Create the adapter from the bridge configuration
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            format: config.storage_format,
            partition_offset: config.partition_offset,
            settle_ms: config.storage_settle_ms,
            block: [0; BLOCK_SIZE],
        }
    }

    /// Watch for the storage magic sequence
    ///
    /// On a match the ack is written synchronously, the line is given time
    /// to drain, and the port is reprogrammed. Anything else buffered is
    /// lost with the reconfiguration.
    pub fn poll_handshake<U: UartPort, const TX: usize, const RX: usize>(
        &mut self,
        channel: &SerialChannel<U, TX, RX>,
        delay: &mut impl DelayNs,
    ) -> Result<StoragePoll> {
        self.check_magic(channel, delay, &[&STORAGE_MAGIC])
    }

    fn check_magic<U: UartPort, const TX: usize, const RX: usize>(
        &mut self,
        channel: &SerialChannel<U, TX, RX>,
        delay: &mut impl DelayNs,
        accepted: &[&[u8]],
    ) -> Result<StoragePoll> {
        let matched = channel.lock(|port| {
            let rx = port.receive_fifo();
            resync(rx, accepted);
            if rx.starts_with(&STORAGE_MAGIC) {
                rx.discard(STORAGE_MAGIC.len());
                port.write_blocking(&STORAGE_ACK);
                true
            } else {
                false
            }
        })?;
        if !matched {
            return Ok(StoragePoll::Idle);
        }

        delay.delay_ms(self.settle_ms);
        channel.reconfigure(self.format)?;

        #[cfg(feature = "defmt")]
        defmt::info!("storage: switched serial port to {} baud", self.format.baud);

        Ok(StoragePoll::SwitchedToStorage)
    }

    /// Serve at most one storage request
    ///
    /// The block read blocks: nothing else in the main loop runs until the
    /// USB transfer completes.
    pub fn poll<U: UartPort, const TX: usize, const RX: usize, D: BlockDevice>(
        &mut self,
        channel: &SerialChannel<U, TX, RX>,
        storage: &mut StorageSlot<D>,
        delay: &mut impl DelayNs,
    ) -> Result<StoragePoll> {
        match self.check_magic(channel, delay, &[&STORAGE_MAGIC, &[STORAGE_READ_COMMAND]])? {
            StoragePoll::Idle => {}
            switched => return Ok(switched),
        }

        let Some(sector) = channel.lock(take_read_request)? else {
            return Ok(StoragePoll::Idle);
        };
        let lba = sector.wrapping_add(self.partition_offset);

        if let Err(_e) = storage
            .device_mut()
            .and_then(|device| device.read_block(lba, &mut self.block))
        {
            #[cfg(feature = "defmt")]
            defmt::error!("storage: read of sector {} failed: {}", lba, _e);
            return Ok(StoragePoll::Dropped(lba));
        }

        let block = &self.block;
        channel.lock(|port| -> Result<()> {
            let mut crc = 0u16;
            for &byte in block.iter() {
                crc = crc16_xmodem_update(crc, byte);
                port.enqueue(byte)?;
            }
            port.enqueue_all(&crc.to_be_bytes())
        })??;

        Ok(StoragePoll::SectorSent(lba))
    }
}

/// Drop leading bytes until the buffered data could still become one of
/// the `accepted` commands
fn resync<const RX: usize>(rx: &mut RingFifo<RX>, accepted: &[&[u8]]) {
    let viable = |fifo: &RingFifo<RX>| {
        accepted.iter().any(|pattern| {
            pattern
                .iter()
                .take(fifo.len())
                .enumerate()
                .all(|(i, &b)| fifo.peek(i) == Some(b))
        })
    };
    while !rx.is_empty() && !viable(&*rx) {
        rx.discard(1);
    }
}

/// Pop a complete read request off the receive FIFO
///
/// Requests wait until the transmit FIFO can take a whole response, so the
/// payload never overflows it.
fn take_read_request<U: UartPort, const TX: usize, const RX: usize>(
    port: &mut super::PortState<U, TX, RX>,
) -> Option<u32> {
    if port.transmit_fifo().free_space() < STORAGE_RESPONSE_LEN {
        return None;
    }
    let rx = port.receive_fifo();
    if rx.len() < STORAGE_REQUEST_LEN || rx.peek(0) != Some(STORAGE_READ_COMMAND) {
        return None;
    }

    rx.discard(1);
    let mut index = [0u8; 4];
    for b in index.iter_mut() {
        *b = rx.pop()?;
    }
    Some(u32::from_be_bytes(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Table-free reference: CRC as polynomial long division over the
    /// message followed by 16 zero bits
    fn crc_reference(data: &[u8]) -> u16 {
        let mut reg: u32 = 0;
        let bits = data
            .iter()
            .flat_map(|&b| (0..8).rev().map(move |i| (b >> i) & 1))
            .chain(core::iter::repeat(0).take(16));
        for bit in bits {
            reg = (reg << 1) | bit as u32;
            if reg & 0x1_0000 != 0 {
                reg ^= 0x1_1021;
            }
        }
        reg as u16
    }

    fn fifo(bytes: &[u8]) -> RingFifo<16> {
        let mut fifo = RingFifo::new();
        bytes.iter().for_each(|&b| fifo.push(b).unwrap());
        fifo
    }

    #[test]
    fn test_resync_keeps_partial_prefix() {
        let mut rx = fifo(b"*");
        resync(&mut rx, &[&STORAGE_MAGIC]);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_resync_drops_garbage() {
        // "**" cannot become "*^" any more, so the window shifts past it too
        let mut rx = fifo(b"xx**^");
        resync(&mut rx, &[&STORAGE_MAGIC]);
        assert_eq!(rx.len(), 2);
        assert!(rx.starts_with(&STORAGE_MAGIC));
    }

    #[test]
    fn test_resync_accepts_read_requests() {
        let mut rx = fifo(b"zR\x00");
        resync(&mut rx, &[&STORAGE_MAGIC, &[STORAGE_READ_COMMAND]]);
        assert_eq!(rx.peek(0), Some(b'R'));
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_crc_check_value() {
        assert_eq!(crc16_xmodem(b"123456789"), 0x31C3);
        assert_eq!(crc_reference(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_crc_zero_block() {
        let block = [0u8; BLOCK_SIZE];
        assert_eq!(crc16_xmodem(&block), crc_reference(&block));
        assert_eq!(crc16_xmodem(&block), 0x0000);
    }

    #[test]
    fn test_crc_matches_reference_on_pattern() {
        let mut block = [0u8; BLOCK_SIZE];
        for (i, b) in block.iter_mut().enumerate() {
            *b = (i * 7 + 3) as u8;
        }
        assert_eq!(crc16_xmodem(&block), crc_reference(&block));
    }
}
