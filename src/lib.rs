//! # RF433 Link Library
//!
//! Interrupt-free link layer for cheap 433 MHz ASK radio modules.
//!
//! This library provides a blocking pulse-train transmitter and a polled,
//! timing-driven receiver that talk to the radio through plain GPIO pins,
//! a busy-wait delay and a microsecond counter. Frames carry fixed-size
//! records protected by a CRC8 or XOR checksum.

pub mod config;
pub mod error;
pub mod hal;
pub mod link;
