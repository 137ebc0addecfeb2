//! # Wire Protocol Constants and Timing
//!
//! Core protocol definitions shared by the transmitter and the receiver.
//!
//! Frame on the wire:
//! ```text
//! preamble: N x (high T, low T)
//! start:    high 2T, low T/2
//! data:     per bit, LSB first: !bit for T/2, bit for T/2
//! end:      pin low, silence >= 2T closes the frame at the receiver
//! ```

use serde::Deserialize;

/// Default bit rate in bits per second
pub const DEFAULT_BIT_RATE: u32 = 3000;

/// Lowest supported bit rate
pub const MIN_BIT_RATE: u32 = 100;

/// Highest bit rate cheap modules can sustain
pub const MAX_BIT_RATE: u32 = 6000;

/// Preamble pulses on a normal link
pub const PREAMBLE_PULSES: u32 = 10;

/// Preamble pulses on a poor link when the previous send was recent
pub const POOR_PREAMBLE_PULSES: u32 = 40;

/// Training time used for the long poor-link preamble
pub const POOR_TRAINING_TIME_US: u32 = 500_000;

/// Idle time after which a poor-link transmitter sends the long preamble
pub const POOR_LINK_COOLDOWN_US: u32 = 400_000;

/// Frames shorter than this are dropped by the receiver, with or without checksum
pub const MIN_FRAME_BYTES: usize = 2;

/// Default transmit/receive buffer capacity in bytes
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Radio hardware quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkQuality {
    /// Decent modules, short fixed preamble
    #[default]
    Normal,

    /// Cheap modules whose receiver AGC needs a long training burst
    Poor,
}

/// Timing constants derived from the bit rate, all in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// One bit period (T)
    pub frame_us: u32,

    /// Half a bit period
    pub half_us: u32,

    /// Start marker width (2T)
    pub start_us: u32,

    start_min: u32,
    start_max: u32,
    frame_min: u32,
    frame_max: u32,
}

impl Timing {
    /// Derive all timing constants for a bit rate
    ///
    /// `bit_rate` must be non-zero; [`crate::config::LinkConfig::validate`]
    /// enforces the supported range.
    ///
    /// # Examples
    ///
    /// ```
    /// use rf433_link::link::protocol::Timing;
    ///
    /// let timing = Timing::from_bit_rate(3000);
    /// assert_eq!(timing.frame_us, 333);
    /// assert_eq!(timing.half_us, 166);
    /// assert_eq!(timing.start_us, 666);
    /// ```
    pub const fn from_bit_rate(bit_rate: u32) -> Self {
        let frame_us = 1_000_000 / bit_rate;
        let start_us = frame_us * 2;

        Self {
            frame_us,
            half_us: frame_us / 2,
            start_us,
            start_min: start_us * 3 / 4,
            start_max: start_us * 5 / 4,
            frame_min: frame_us * 3 / 4,
            frame_max: frame_us * 5 / 4,
        }
    }

    /// True if a pulse is long enough to be the start marker
    pub fn is_start(&self, elapsed_us: u32) -> bool {
        elapsed_us > self.start_min && elapsed_us < self.start_max
    }

    /// True if an edge falls on the next bit boundary
    pub fn is_bit(&self, elapsed_us: u32) -> bool {
        elapsed_us > self.frame_min && elapsed_us < self.frame_max
    }

    /// Silence after which an open frame is closed
    pub fn silence_us(&self) -> u32 {
        self.frame_us * 2
    }

    /// Preamble length used by a poor-link transmitter after a quiet period
    pub fn long_preamble_pulses(&self) -> u32 {
        (POOR_TRAINING_TIME_US / self.frame_us / 2).max(POOR_PREAMBLE_PULSES)
    }

    /// Approximate time a transmitter blocks for a frame
    ///
    /// # Arguments
    ///
    /// * `frame_len` - Bytes on the wire (payload + checksum)
    /// * `preamble_pulses` - Number of preamble pulses
    pub fn airtime_us(&self, frame_len: usize, preamble_pulses: u32) -> u64 {
        let preamble = preamble_pulses as u64 * 2 * self.frame_us as u64;
        let start = self.start_us as u64 + self.half_us as u64;
        let data = frame_len as u64 * 8 * 2 * self.half_us as u64;
        preamble + start + data
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::from_bit_rate(DEFAULT_BIT_RATE)
    }
}
