//! # Simulated Wire
//!
//! A virtual-time radio link for running the transmitter and receiver on a
//! host. One [`SimWire`] hands out an output pin, an input pin, a busy-wait
//! delay and a microsecond clock that all share a single timeline:
//!
//! - the output pin records every level change at the current virtual time
//! - the delay advances virtual time instead of sleeping
//! - the input pin reads back the recorded level at the current virtual time
//! - the clock reports virtual time, optionally offset (to exercise counter
//!   wraparound) and skewed (to model a receiver crystal running fast or slow)
//!
//! Pin faults can be injected on the wire to exercise GPIO error handling.
//!
//! A typical loopback records a transmission, rewinds, and then steps time
//! forward while polling a receiver:
//!
//! ```
//! use rf433_link::hal::sim::SimWire;
//! use embedded_hal::delay::DelayNs;
//! use embedded_hal::digital::{InputPin, OutputPin};
//!
//! let wire = SimWire::new();
//! let mut tx = wire.tx_pin();
//! let mut delay = wire.delay();
//! tx.set_high().unwrap();
//! delay.delay_us(100);
//! tx.set_low().unwrap();
//!
//! wire.rewind();
//! let mut rx = wire.rx_pin();
//! assert!(rx.is_high().unwrap());
//! wire.advance_us(100);
//! assert!(rx.is_low().unwrap());
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error, ErrorKind, ErrorType, InputPin, OutputPin};

use super::MicrosClock;

/// A recorded level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Virtual time of the change in nanoseconds
    pub at_ns: u64,

    /// Level after the change
    pub level: bool,
}

/// Error returned by a faulted simulated pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPinError(pub ErrorKind);

impl Error for SimPinError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct PinFault {
    /// Pin operations that still succeed before the fault fires
    after: usize,
    kind: ErrorKind,
    once: bool,
}

#[derive(Debug, Default)]
struct WireState {
    now_ns: u64,
    driven: bool,
    edges: Vec<Edge>,
    pin_fault: Option<PinFault>,
}

impl WireState {
    fn level_at(&self, at_ns: u64) -> bool {
        let idx = self.edges.partition_point(|edge| edge.at_ns <= at_ns);
        idx > 0 && self.edges[idx - 1].level
    }
}

/// Shared virtual-time wire
#[derive(Debug, Clone, Default)]
pub struct SimWire {
    state: Arc<Mutex<WireState>>,
}

impl SimWire {
    /// Create an idle (low) wire at virtual time zero
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WireState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Output pin driving the wire
    pub fn tx_pin(&self) -> SimOutputPin {
        SimOutputPin { wire: self.clone() }
    }

    /// Input pin sampling the wire
    pub fn rx_pin(&self) -> SimInputPin {
        SimInputPin { wire: self.clone() }
    }

    /// Busy-wait delay that advances virtual time
    pub fn delay(&self) -> SimDelay {
        SimDelay { wire: self.clone() }
    }

    /// Clock reporting virtual time in microseconds
    pub fn clock(&self) -> SimClock {
        self.clock_with(0, 0)
    }

    /// Clock with a counter offset and a rate error
    ///
    /// # Arguments
    ///
    /// * `offset_us` - Counter value at virtual time zero
    /// * `skew_ppm` - Rate error in parts per million (10_000 = 1% fast)
    pub fn clock_with(&self, offset_us: u32, skew_ppm: i32) -> SimClock {
        SimClock {
            wire: self.clone(),
            offset_us,
            skew_ppm,
            step_ns: 0,
        }
    }

    /// Drive the wire at the current virtual time
    pub fn drive(&self, level: bool) {
        let mut state = self.lock();
        if state.driven != level {
            let at_ns = state.now_ns;
            state.edges.push(Edge { at_ns, level });
            state.driven = level;
        }
    }

    /// Level seen by a receiver at the current virtual time
    pub fn level(&self) -> bool {
        let state = self.lock();
        state.level_at(state.now_ns)
    }

    /// Advance virtual time
    pub fn advance_us(&self, us: u64) {
        self.advance_ns(us * 1_000);
    }

    /// Advance virtual time with nanosecond resolution
    pub fn advance_ns(&self, ns: u64) {
        self.lock().now_ns += ns;
    }

    /// Current virtual time in nanoseconds
    pub fn now_ns(&self) -> u64 {
        self.lock().now_ns
    }

    /// Return to virtual time zero, keeping the recorded edges for replay
    pub fn rewind(&self) {
        self.lock().now_ns = 0;
    }

    /// Fail every pin operation from now on
    pub fn set_pin_error(&self, kind: ErrorKind) {
        self.set_pin_error_after(0, kind);
    }

    /// Let `ops` pin operations succeed, then fail every one after them
    pub fn set_pin_error_after(&self, ops: usize, kind: ErrorKind) {
        self.lock().pin_fault = Some(PinFault { after: ops, kind, once: false });
    }

    /// Let `ops` pin operations succeed, then fail only the next one
    pub fn glitch_pin_after(&self, ops: usize, kind: ErrorKind) {
        self.lock().pin_fault = Some(PinFault { after: ops, kind, once: true });
    }

    /// Remove any injected pin fault
    pub fn clear_pin_error(&self) {
        self.lock().pin_fault = None;
    }

    /// Account for one pin operation against the injected fault
    fn pin_op(&self) -> Result<(), SimPinError> {
        let mut state = self.lock();
        let Some(fault) = state.pin_fault.as_mut() else {
            return Ok(());
        };
        if fault.after > 0 {
            fault.after -= 1;
            return Ok(());
        }

        let (kind, once) = (fault.kind, fault.once);
        if once {
            state.pin_fault = None;
        }
        Err(SimPinError(kind))
    }

    /// Forget the recording and return to an idle wire at time zero
    pub fn clear(&self) {
        *self.lock() = WireState::default();
    }

    /// All recorded edges in time order
    pub fn edges(&self) -> Vec<Edge> {
        self.lock().edges.clone()
    }

    /// Time of the last recorded edge
    pub fn end_ns(&self) -> u64 {
        self.lock().edges.last().map_or(0, |edge| edge.at_ns)
    }

    /// Held level and its duration in microseconds, for each pair of edges
    pub fn pulse_widths_us(&self) -> Vec<(bool, u64)> {
        self.lock()
            .edges
            .windows(2)
            .map(|pair| (pair[0].level, (pair[1].at_ns - pair[0].at_ns) / 1_000))
            .collect()
    }
}

/// Output side of a [`SimWire`]
#[derive(Debug, Clone)]
pub struct SimOutputPin {
    wire: SimWire,
}

impl ErrorType for SimOutputPin {
    type Error = SimPinError;
}

impl OutputPin for SimOutputPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.wire.pin_op()?;
        self.wire.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.wire.pin_op()?;
        self.wire.drive(true);
        Ok(())
    }
}

/// Input side of a [`SimWire`]
#[derive(Debug, Clone)]
pub struct SimInputPin {
    wire: SimWire,
}

impl ErrorType for SimInputPin {
    type Error = SimPinError;
}

impl InputPin for SimInputPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.wire.pin_op()?;
        Ok(self.wire.level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.wire.pin_op()?;
        Ok(!self.wire.level())
    }
}

/// Delay that advances the virtual time of a [`SimWire`]
#[derive(Debug, Clone)]
pub struct SimDelay {
    wire: SimWire,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.wire.advance_ns(ns as u64);
    }
}

/// Microsecond clock of a [`SimWire`]
#[derive(Debug, Clone)]
pub struct SimClock {
    wire: SimWire,
    offset_us: u32,
    skew_ppm: i32,
    step_ns: u64,
}

impl SimClock {
    /// Advance the wire by `step_us` on every read
    ///
    /// Models the time a busy loop spends between clock reads, so blocking
    /// calls such as [`Receiver::poll_blocking`](crate::link::receiver::Receiver::poll_blocking)
    /// make progress on their own.
    pub fn stepping(mut self, step_us: u64) -> Self {
        self.step_ns = step_us * 1_000;
        self
    }
}

impl MicrosClock for SimClock {
    fn now_us(&mut self) -> u32 {
        if self.step_ns > 0 {
            self.wire.advance_ns(self.step_ns);
        }

        let now_ns = self.wire.now_ns() as i128;
        let scaled_us = now_ns * (1_000_000 + self.skew_ppm as i128) / 1_000_000_000;

        // Truncation models the hardware counter wrapping at 2^32
        self.offset_us.wrapping_add(scaled_us as u32)
    }
}
