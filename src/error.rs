//! # Error Types
//!
//! Custom error types for the RF433 link layer using `thiserror`.
//!
//! Timing noise, checksum mismatches and receive-buffer overflows are not
//! errors: the receiver drops the frame and re-arms. Only caller misuse,
//! GPIO failures and configuration problems are reported.

use embedded_hal::digital::ErrorKind;
use thiserror::Error;

/// Main error type for the link layer
#[derive(Debug, Error)]
pub enum LinkError {
    /// Payload plus checksum does not fit the transmitter buffer
    #[error("Payload of {size} bytes plus {checksum} checksum byte(s) exceeds buffer capacity {capacity}")]
    PayloadTooLarge {
        size: usize,
        checksum: usize,
        capacity: usize,
    },

    /// Requested record is larger than the receive buffer
    #[error("Record of {size} bytes does not fit receive buffer of {capacity} bytes")]
    RecordTooLarge { size: usize, capacity: usize },

    /// GPIO read or write failed
    #[error("Pin error: {0:?}")]
    Pin(ErrorKind),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Map an `embedded-hal` pin error into [`LinkError::Pin`]
    pub fn pin<E: embedded_hal::digital::Error>(err: E) -> Self {
        LinkError::Pin(err.kind())
    }
}

/// Result type alias for the link layer
pub type Result<T> = std::result::Result<T, LinkError>;
