//! # Pulse-Train Transmitter
//!
//! Encodes frames into a timed pulse train on one output pin.
//!
//! Transmission is fully blocking: the pin is toggled with busy-wait delays
//! and nothing else runs until the frame is out. Airtime is roughly
//! `(2 * preamble + 2.5 + 8 * frame_len)` bit periods, see
//! [`Timing::airtime_us`].

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use tracing::{debug, warn};

use super::crc::ChecksumMode;
use super::protocol::*;
use super::record::WireRecord;
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::hal::{elapsed_us, MicrosClock};

/// Blocking transmitter bound to one output pin
///
/// The clock is only consulted on a poor link, to decide between the short
/// and the long preamble.
pub struct Transmitter<P, D, C> {
    pin: P,
    delay: D,
    clock: C,
    timing: Timing,
    quality: LinkQuality,
    checksum: ChecksumMode,
    buffer: Vec<u8>,
    last_send_us: Option<u32>,
}

impl<P, D, C> std::fmt::Debug for Transmitter<P, D, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("timing", &self.timing)
            .field("quality", &self.quality)
            .field("checksum", &self.checksum)
            .field("capacity", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl<P, D, C> Transmitter<P, D, C>
where
    P: OutputPin,
    D: DelayNs,
    C: MicrosClock,
{
    /// Create a transmitter
    ///
    /// # Arguments
    ///
    /// * `pin` - Output pin wired to the radio's data input
    /// * `delay` - Busy-wait delay used for pulse timing
    /// * `clock` - Microsecond counter (poor-link cooldown tracking)
    /// * `link` - Wire parameters, must match the receiver
    /// * `buffer_capacity` - Largest frame (payload + checksum) in bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bit rate or the capacity is out of range
    ///
    /// # Examples
    ///
    /// ```
    /// use rf433_link::config::LinkConfig;
    /// use rf433_link::hal::sim::SimWire;
    /// use rf433_link::link::transmitter::Transmitter;
    ///
    /// let wire = SimWire::new();
    /// let mut tx = Transmitter::new(wire.tx_pin(), wire.delay(), wire.clock(), &LinkConfig::default(), 64)?;
    /// tx.send_data(&0x0102_0304u32)?;
    /// # Ok::<(), rf433_link::error::LinkError>(())
    /// ```
    pub fn new(pin: P, delay: D, clock: C, link: &LinkConfig, buffer_capacity: usize) -> Result<Self> {
        link.validate()?;
        crate::config::validate_capacity("transmitter", buffer_capacity)?;

        Ok(Self {
            pin,
            delay,
            clock,
            timing: link.timing(),
            quality: link.quality,
            checksum: link.checksum,
            buffer: vec![0u8; buffer_capacity],
            last_send_us: None,
        })
    }

    /// Serialize a record and send it with its checksum
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::PayloadTooLarge`] if the record plus checksum
    /// does not fit the buffer; nothing is transmitted in that case.
    pub fn send_data<T: WireRecord>(&mut self, value: &T) -> Result<()> {
        self.send_with(T::WIRE_SIZE, |out| value.encode(out))
    }

    /// Send raw payload bytes with their checksum
    ///
    /// # Errors
    ///
    /// Same as [`Transmitter::send_data`]
    pub fn send_bytes(&mut self, payload: &[u8]) -> Result<()> {
        self.send_with(payload.len(), |out| out.copy_from_slice(payload))
    }

    fn send_with(&mut self, size: usize, fill: impl FnOnce(&mut [u8])) -> Result<()> {
        let checksum_len = self.checksum.len();
        let capacity = self.buffer.len();
        if size + checksum_len > capacity {
            return Err(LinkError::PayloadTooLarge {
                size,
                checksum: checksum_len,
                capacity,
            });
        }

        fill(&mut self.buffer[..size]);
        if let Some(crc) = self.checksum.compute(&self.buffer[..size]) {
            self.buffer[size] = crc;
        }

        let frame_len = size + checksum_len;
        let frame = std::mem::take(&mut self.buffer);
        let result = self.write(&frame[..frame_len]);
        self.buffer = frame;
        result
    }

    /// Transmit bytes as one frame, blocking until done
    ///
    /// No checksum is added; `bytes` go on the wire as given.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Pin`] if the output pin fails. The frame is cut
    /// short and the line is driven low before returning.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() < MIN_FRAME_BYTES {
            warn!(
                "Frame of {} byte(s) is below the receiver minimum of {}",
                bytes.len(),
                MIN_FRAME_BYTES
            );
        }

        let pulses = self.next_preamble_pulses();
        if let Err(err) = self.write_pulses(bytes, pulses) {
            // Drop the carrier; the first failure is the one reported
            let _ = self.pin.set_low();
            return Err(err);
        }

        if self.quality == LinkQuality::Poor {
            self.last_send_us = Some(self.clock.now_us());
        }

        debug!("Sent frame ({} bytes, {} preamble pulses)", bytes.len(), pulses);
        Ok(())
    }

    fn write_pulses(&mut self, bytes: &[u8], pulses: u32) -> Result<()> {
        let frame_us = self.timing.frame_us;
        let half_us = self.timing.half_us;

        for _ in 0..pulses {
            self.set_level(true)?;
            self.delay.delay_us(frame_us);
            self.set_level(false)?;
            self.delay.delay_us(frame_us);
        }

        // Start marker
        self.set_level(true)?;
        self.delay.delay_us(self.timing.start_us);
        self.set_level(false)?;
        self.delay.delay_us(half_us);

        for &byte in bytes {
            let mut data = byte;
            for _ in 0..8 {
                let bit = data & 1 != 0;
                self.set_level(!bit)?;
                self.delay.delay_us(half_us);
                self.set_level(bit)?;
                self.delay.delay_us(half_us);
                data >>= 1;
            }
        }

        self.set_level(false)
    }

    fn set_level(&mut self, high: bool) -> Result<()> {
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(LinkError::pin)
    }

    /// Preamble length the next [`Transmitter::write`] will use
    ///
    /// A poor-link transmitter that has been quiet for more than
    /// [`POOR_LINK_COOLDOWN_US`] (or has never sent) uses the long preamble
    /// so the receiver's gain control can settle.
    pub fn next_preamble_pulses(&mut self) -> u32 {
        match self.quality {
            LinkQuality::Normal => PREAMBLE_PULSES,
            LinkQuality::Poor => match self.last_send_us {
                Some(last) if elapsed_us(self.clock.now_us(), last) <= POOR_LINK_COOLDOWN_US => {
                    POOR_PREAMBLE_PULSES
                }
                _ => self.timing.long_preamble_pulses(),
            },
        }
    }

    /// Blocking time of a frame with `frame_len` bytes on the wire
    pub fn airtime_us(&mut self, frame_len: usize) -> u64 {
        let pulses = self.next_preamble_pulses();
        self.timing.airtime_us(frame_len, pulses)
    }

    /// Contents of the send buffer (last frame sent through `send_*`)
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Derived timing constants
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Checksum mode in use
    pub fn checksum(&self) -> ChecksumMode {
        self.checksum
    }

    /// Release the pin, delay and clock
    pub fn release(self) -> (P, D, C) {
        (self.pin, self.delay, self.clock)
    }
}
