//! # Link Layer Module
//!
//! Software framing for 433 MHz ASK modules driven straight from GPIO.
//!
//! This module handles:
//! - Pulse-train encoding (preamble, start marker, self-clocking bit code)
//! - Timing-driven decoding with drift-tracking clock recovery
//! - CRC8 / XOR frame checksums
//! - Fixed-size record serialization

pub mod protocol;
pub mod crc;
pub mod record;
pub mod transmitter;
pub mod receiver;
