//! # Configuration Module
//!
//! Handles loading and validating link configuration from TOML files.
//!
//! Both ends of a link must agree on `[link]`; buffer capacities are local
//! to each side.
//!
//! ```toml
//! [link]
//! bit_rate = 3000
//! quality = "normal"   # or "poor"
//! checksum = "crc8"    # or "xor", "none"
//!
//! [transmitter]
//! buffer_capacity = 64
//!
//! [receiver]
//! buffer_capacity = 64
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{LinkError, Result};
use crate::link::crc::ChecksumMode;
use crate::link::protocol::{
    LinkQuality, Timing, DEFAULT_BIT_RATE, DEFAULT_BUFFER_CAPACITY, MAX_BIT_RATE, MIN_BIT_RATE,
    MIN_FRAME_BYTES,
};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub transmitter: TransmitterConfig,

    #[serde(default)]
    pub receiver: ReceiverConfig,
}

/// Wire parameters shared by both ends of a link
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    #[serde(default = "default_bit_rate")]
    pub bit_rate: u32,

    #[serde(default)]
    pub quality: LinkQuality,

    #[serde(default)]
    pub checksum: ChecksumMode,
}

/// Transmitter configuration
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TransmitterConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

/// Receiver configuration
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

// Default value functions
fn default_bit_rate() -> u32 { DEFAULT_BIT_RATE }
fn default_buffer_capacity() -> usize { DEFAULT_BUFFER_CAPACITY }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bit_rate: default_bit_rate(),
            quality: LinkQuality::default(),
            checksum: ChecksumMode::default(),
        }
    }
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self { buffer_capacity: default_buffer_capacity() }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self { buffer_capacity: default_buffer_capacity() }
    }
}

impl LinkConfig {
    /// Validate wire parameters
    ///
    /// # Errors
    ///
    /// Returns error if the bit rate is outside `MIN_BIT_RATE..=MAX_BIT_RATE`
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BIT_RATE..=MAX_BIT_RATE).contains(&self.bit_rate) {
            return Err(LinkError::Config(toml::de::Error::custom(format!(
                "bit_rate must be between {} and {}",
                MIN_BIT_RATE, MAX_BIT_RATE
            ))));
        }

        Ok(())
    }

    /// Timing constants for this bit rate
    pub fn timing(&self) -> Timing {
        Timing::from_bit_rate(self.bit_rate)
    }
}

/// Validate a transmitter or receiver buffer capacity
///
/// A buffer must hold at least the smallest frame the receiver accepts.
pub(crate) fn validate_capacity(side: &str, capacity: usize) -> Result<()> {
    if capacity < MIN_FRAME_BYTES {
        return Err(LinkError::Config(toml::de::Error::custom(format!(
            "{} buffer_capacity must be at least {}",
            side, MIN_FRAME_BYTES
        ))));
    }

    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rf433_link::config::Config;
    ///
    /// let config = Config::load("config/link.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        self.link.validate()?;
        validate_capacity("transmitter", self.transmitter.buffer_capacity)?;
        validate_capacity("receiver", self.receiver.buffer_capacity)?;

        // A payload that fits the transmitter but not the receiver is always lost
        if self.transmitter.buffer_capacity > self.receiver.buffer_capacity {
            tracing::warn!(
                "transmitter buffer ({} bytes) is larger than receiver buffer ({} bytes)",
                self.transmitter.buffer_capacity,
                self.receiver.buffer_capacity
            );
        }

        Ok(())
    }

    /// Largest payload that survives the link in one frame
    pub fn max_payload(&self) -> usize {
        self.transmitter
            .buffer_capacity
            .min(self.receiver.buffer_capacity)
            .saturating_sub(self.link.checksum.len())
    }
}
