//! # Timing-Driven Receiver
//!
//! Decodes the pulse train by sampling one input pin each time
//! [`Receiver::poll`] is called and measuring the time between edges.
//!
//! State machine:
//! ```text
//!   Idle --rising edge--> EdgeCandidate --pulse ~2T--> Framing --silence >= 2T--> Idle
//!                              |                          |
//!                              +--other pulse--> Idle     +--buffer overflow--> Idle
//! ```
//!
//! Poll at least twice per bit period. Edges that fall between polls are
//! lost, and with them the frame.

use embedded_hal::digital::InputPin;
use tracing::{debug, trace};

use super::crc::ChecksumMode;
use super::protocol::*;
use super::record::WireRecord;
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::hal::{elapsed_us, MicrosClock};

/// Receiver parse state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    /// Waiting for a rising edge
    #[default]
    Idle,

    /// Saw a rising edge, waiting to see if the pulse is a start marker
    EdgeCandidate,

    /// Collecting data bits
    Framing,
}

/// Non-blocking receiver bound to one input pin
pub struct Receiver<P, C> {
    pin: P,
    clock: C,
    timing: Timing,
    checksum: ChecksumMode,
    buffer: Vec<u8>,
    state: ParseState,
    reference_us: u32,
    prev_level: bool,
    bit_count: u8,
    byte_count: usize,
    size: usize,
    data_ready: bool,
}

impl<P, C> std::fmt::Debug for Receiver<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("timing", &self.timing)
            .field("checksum", &self.checksum)
            .field("capacity", &self.buffer.len())
            .field("state", &self.state)
            .field("size", &self.size)
            .field("data_ready", &self.data_ready)
            .finish_non_exhaustive()
    }
}

impl<P, C> Receiver<P, C>
where
    P: InputPin,
    C: MicrosClock,
{
    /// Create a receiver
    ///
    /// # Arguments
    ///
    /// * `pin` - Input pin wired to the radio's data output
    /// * `clock` - Microsecond counter
    /// * `link` - Wire parameters, must match the transmitter
    /// * `buffer_capacity` - Largest frame (payload + checksum) in bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bit rate or the capacity is out of range
    pub fn new(pin: P, clock: C, link: &LinkConfig, buffer_capacity: usize) -> Result<Self> {
        link.validate()?;
        crate::config::validate_capacity("receiver", buffer_capacity)?;

        Ok(Self {
            pin,
            clock,
            timing: link.timing(),
            checksum: link.checksum,
            buffer: vec![0u8; buffer_capacity],
            state: ParseState::Idle,
            reference_us: 0,
            prev_level: false,
            bit_count: 0,
            byte_count: 0,
            size: 0,
            data_ready: false,
        })
    }

    /// Sample the pin once and advance the decoder
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Payload size of a frame that was just accepted, 0 otherwise
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Pin`] if the input pin fails. Noise, checksum
    /// mismatches and overflows are not errors; the frame is dropped.
    pub fn poll(&mut self) -> Result<usize> {
        let elapsed = elapsed_us(self.clock.now_us(), self.reference_us);

        if self.state == ParseState::Framing && elapsed >= self.timing.silence_us() {
            return Ok(self.close_frame());
        }

        let level = self.pin.is_high().map_err(LinkError::pin)?;
        if level == self.prev_level {
            return Ok(0);
        }
        let rising = level && !self.prev_level;

        match self.state {
            ParseState::EdgeCandidate => {
                self.reference_us = self.reference_us.wrapping_add(elapsed);
                if self.timing.is_start(elapsed) {
                    self.start_frame();
                } else {
                    self.state = ParseState::Idle;
                }
            }
            ParseState::Framing => self.framing_edge(elapsed, rising),
            ParseState::Idle => {}
        }

        if rising && self.state == ParseState::Idle {
            self.state = ParseState::EdgeCandidate;
            self.reference_us = self.reference_us.wrapping_add(elapsed);
        }

        self.prev_level = level;
        Ok(0)
    }

    fn start_frame(&mut self) {
        self.state = ParseState::Framing;
        self.byte_count = 0;
        self.bit_count = 0;
        self.size = 0;
        self.data_ready = false;
        self.buffer.fill(0);
    }

    fn framing_edge(&mut self, elapsed: u32, rising: bool) {
        // Half-period boundary edges fall outside the window and leave the
        // reference on the previous bit centre
        if !self.timing.is_bit(elapsed) {
            return;
        }

        if self.byte_count >= self.buffer.len() {
            trace!("Receive buffer full ({} bytes), dropping frame", self.byte_count);
            self.state = ParseState::Idle;
            return;
        }

        self.reference_us = self.reference_us.wrapping_add(elapsed);
        let byte = &mut self.buffer[self.byte_count];
        *byte >>= 1;
        if rising {
            *byte |= 0x80;
        }

        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bit_count = 0;
            self.byte_count += 1;
        }
    }

    fn close_frame(&mut self) -> usize {
        self.state = ParseState::Idle;
        self.size = 0;

        let frame = &self.buffer[..self.byte_count];
        if self.byte_count < MIN_FRAME_BYTES {
            trace!("Dropping short frame ({} bytes)", self.byte_count);
        } else if !self.checksum.verify(frame) {
            trace!("Dropping frame with bad {:?} checksum ({} bytes)", self.checksum, self.byte_count);
        } else {
            self.size = self.byte_count - self.checksum.len();
            self.data_ready = true;
            debug!("Received frame ({} payload bytes)", self.size);
        }

        self.size
    }

    /// Poll until the frame in progress closes
    ///
    /// Returns immediately with 0 when no frame is being received.
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Payload size if the frame was accepted, 0 if it was dropped
    pub fn poll_blocking(&mut self) -> Result<usize> {
        loop {
            let size = self.poll()?;
            if size > 0 {
                return Ok(size);
            }
            if self.state != ParseState::Framing {
                return Ok(0);
            }
        }
    }

    /// Poll once and report a newly accepted frame
    ///
    /// Returns `true` exactly once per accepted frame.
    pub fn has_data(&mut self) -> Result<bool> {
        self.poll()?;
        Ok(std::mem::take(&mut self.data_ready))
    }

    /// Copy the start of the receive buffer into a record
    ///
    /// Does not check that a frame is ready; gate on [`Receiver::has_data`].
    ///
    /// # Returns
    ///
    /// * `bool` - `false` if the record is larger than the receive buffer
    pub fn read_into<T: WireRecord>(&self, value: &mut T) -> bool {
        match self.read_record() {
            Ok(record) => {
                *value = record;
                true
            }
            Err(_) => false,
        }
    }

    /// Decode a record from the start of the receive buffer
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::RecordTooLarge`] if the record is larger than the
    /// receive buffer
    pub fn read_record<T: WireRecord>(&self) -> Result<T> {
        if T::WIRE_SIZE > self.buffer.len() {
            return Err(LinkError::RecordTooLarge {
                size: T::WIRE_SIZE,
                capacity: self.buffer.len(),
            });
        }
        Ok(T::decode(&self.buffer[..T::WIRE_SIZE]))
    }

    /// Payload size of the last accepted frame
    pub fn size(&self) -> usize {
        self.size
    }

    /// Payload bytes of the last accepted frame
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.size]
    }

    /// Whole receive buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Current parse state
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Derived timing constants
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Release the pin and clock
    pub fn release(self) -> (P, C) {
        (self.pin, self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{SimClock, SimInputPin, SimWire};
    use crate::link::crc::crc8;
    use embedded_hal::digital::ErrorKind;

    fn receiver(wire: &SimWire, checksum: ChecksumMode, capacity: usize) -> Receiver<SimInputPin, SimClock> {
        let link = LinkConfig {
            checksum,
            ..LinkConfig::default()
        };
        Receiver::new(wire.rx_pin(), wire.clock(), &link, capacity).unwrap()
    }

    /// Hand-build a waveform: preamble, start marker, then the given bytes
    fn drive_frame(wire: &SimWire, bytes: &[u8]) {
        let t = Timing::default();
        for _ in 0..PREAMBLE_PULSES {
            wire.drive(true);
            wire.advance_us(t.frame_us as u64);
            wire.drive(false);
            wire.advance_us(t.frame_us as u64);
        }
        wire.drive(true);
        wire.advance_us(t.start_us as u64);
        wire.drive(false);
        wire.advance_us(t.half_us as u64);
        for &byte in bytes {
            for i in 0..8 {
                let bit = (byte >> i) & 1 != 0;
                wire.drive(!bit);
                wire.advance_us(t.half_us as u64);
                wire.drive(bit);
                wire.advance_us(t.half_us as u64);
            }
        }
        wire.drive(false);
    }

    /// Replay the recorded waveform into the receiver, polling every `step_us`
    fn replay(wire: &SimWire, rx: &mut Receiver<SimInputPin, SimClock>, step_us: u64) -> Vec<usize> {
        let end = wire.end_ns() + 3 * rx.timing().silence_us() as u64 * 1_000;
        let mut accepted = Vec::new();
        wire.rewind();
        while wire.now_ns() < end {
            let size = rx.poll().unwrap();
            if size > 0 {
                accepted.push(size);
            }
            wire.advance_us(step_us);
        }
        accepted
    }

    #[test]
    fn test_receives_crc8_frame() {
        let wire = SimWire::new();
        let payload = [0x04, 0x03, 0x02, 0x01];
        let mut frame = payload.to_vec();
        frame.push(crc8(&payload));
        drive_frame(&wire, &frame);

        let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(replay(&wire, &mut rx, 10), vec![4]);
        assert_eq!(rx.size(), 4);
        assert_eq!(rx.payload(), &payload);
        assert_eq!(rx.read_record::<u32>().unwrap(), 0x0102_0304);
        assert_eq!(rx.state(), ParseState::Idle);
    }

    #[test]
    fn test_corrupted_frame_is_dropped() {
        let wire = SimWire::new();
        let payload = [0x04, 0x03, 0x02, 0x01];
        let mut frame = payload.to_vec();
        frame.push(crc8(&payload) ^ 0x01);
        drive_frame(&wire, &frame);

        let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);
        assert!(replay(&wire, &mut rx, 10).is_empty());
        assert_eq!(rx.size(), 0);
        assert!(!rx.has_data().unwrap());
        assert_eq!(rx.state(), ParseState::Idle);
    }

    #[test]
    fn test_minimum_frame_size_without_checksum() {
        let wire = SimWire::new();
        drive_frame(&wire, &[0x5A]);

        let mut rx = receiver(&wire, ChecksumMode::Disabled, DEFAULT_BUFFER_CAPACITY);
        assert!(replay(&wire, &mut rx, 10).is_empty());

        wire.clear();
        drive_frame(&wire, &[0x5A, 0xA5]);
        assert_eq!(replay(&wire, &mut rx, 10), vec![2]);
        assert_eq!(rx.payload(), &[0x5A, 0xA5]);
    }

    #[test]
    fn test_overflow_aborts_to_idle() {
        let wire = SimWire::new();
        drive_frame(&wire, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

        let mut rx = receiver(&wire, ChecksumMode::Disabled, 4);
        assert!(replay(&wire, &mut rx, 10).is_empty());
        assert_eq!(rx.state(), ParseState::Idle);
        assert!(!rx.has_data().unwrap());
        assert_eq!(rx.buffer().len(), 4);
    }

    #[test]
    fn test_frame_filling_buffer_exactly_is_accepted() {
        let wire = SimWire::new();
        let payload = [0x10, 0x20, 0x30];
        let mut frame = payload.to_vec();
        frame.push(crc8(&payload));
        drive_frame(&wire, &frame);

        let mut rx = receiver(&wire, ChecksumMode::Crc8, 4);
        assert_eq!(replay(&wire, &mut rx, 10), vec![3]);
        assert_eq!(rx.payload(), &payload);
    }

    #[test]
    fn test_start_marker_outside_window_is_noise() {
        let t = Timing::default();

        // 74% and 126% of the start marker width
        for width in [t.start_us * 74 / 100, t.start_us * 126 / 100] {
            let wire = SimWire::new();
            let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);

            wire.drive(true);
            wire.advance_us(width as u64);
            wire.drive(false);

            wire.rewind();
            rx.poll().unwrap();
            assert_eq!(rx.state(), ParseState::EdgeCandidate);
            wire.advance_us(width as u64);
            rx.poll().unwrap();
            assert_eq!(rx.state(), ParseState::Idle, "width {} accepted as start", width);
        }
    }

    #[test]
    fn test_start_marker_inside_window_starts_framing() {
        let t = Timing::default();

        for width in [t.start_us * 76 / 100, t.start_us, t.start_us * 124 / 100] {
            let wire = SimWire::new();
            let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);

            wire.drive(true);
            wire.advance_us(width as u64);
            wire.drive(false);

            wire.rewind();
            rx.poll().unwrap();
            wire.advance_us(width as u64);
            rx.poll().unwrap();
            assert_eq!(rx.state(), ParseState::Framing, "width {} rejected", width);
        }
    }

    #[test]
    fn test_bit_edge_outside_window_is_ignored() {
        let t = Timing::default();
        let wire = SimWire::new();
        let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);

        // Start marker, then an edge at 70% of a bit period
        wire.drive(true);
        wire.advance_us(t.start_us as u64);
        wire.drive(false);
        wire.advance_us((t.frame_us * 70 / 100) as u64);
        wire.drive(true);

        wire.rewind();
        rx.poll().unwrap();
        wire.advance_us(t.start_us as u64);
        rx.poll().unwrap();
        assert_eq!(rx.state(), ParseState::Framing);
        let reference = rx.reference_us;

        wire.advance_us((t.frame_us * 70 / 100) as u64);
        rx.poll().unwrap();
        assert_eq!(rx.state(), ParseState::Framing);
        assert_eq!(rx.bit_count, 0);
        assert_eq!(rx.reference_us, reference);
        assert!(rx.prev_level);
    }

    #[test]
    fn test_silence_closes_frame() {
        let t = Timing::default();
        let wire = SimWire::new();
        let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);

        wire.drive(true);
        wire.advance_us(t.start_us as u64);
        wire.drive(false);

        wire.rewind();
        rx.poll().unwrap();
        wire.advance_us(t.start_us as u64);
        rx.poll().unwrap();
        assert_eq!(rx.state(), ParseState::Framing);

        wire.advance_us(t.silence_us() as u64 - 1);
        assert_eq!(rx.poll().unwrap(), 0);
        assert_eq!(rx.state(), ParseState::Framing);

        wire.advance_us(1);
        assert_eq!(rx.poll().unwrap(), 0);
        assert_eq!(rx.state(), ParseState::Idle);
    }

    #[test]
    fn test_poll_without_edge_is_idempotent() {
        let wire = SimWire::new();
        let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);

        for _ in 0..100 {
            wire.advance_us(50);
            assert_eq!(rx.poll().unwrap(), 0);
            assert_eq!(rx.state(), ParseState::Idle);
            assert_eq!(rx.reference_us, 0);
        }

        // Armed on a rising edge, then quiet
        wire.drive(true);
        rx.poll().unwrap();
        let reference = rx.reference_us;
        for _ in 0..100 {
            wire.advance_us(50);
            rx.poll().unwrap();
            assert_eq!(rx.state(), ParseState::EdgeCandidate);
            assert_eq!(rx.reference_us, reference);
        }
    }

    /// Drive a start marker and one `1` bit live, leaving the receiver framing
    fn start_framing(wire: &SimWire, rx: &mut Receiver<SimInputPin, SimClock>) {
        let t = Timing::default();
        wire.drive(true);
        rx.poll().unwrap();
        wire.advance_us(t.start_us as u64);
        wire.drive(false);
        rx.poll().unwrap();
        wire.advance_us(t.frame_us as u64 - 1);
        wire.drive(true);
        rx.poll().unwrap();
        assert_eq!(rx.state(), ParseState::Framing);
    }

    #[test]
    fn test_poll_without_edge_is_idempotent_while_framing() {
        let t = Timing::default();
        let wire = SimWire::new();
        let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);
        start_framing(&wire, &mut rx);

        let reference = rx.reference_us;
        assert_eq!(reference, t.start_us + t.frame_us - 1);
        assert_eq!(rx.bit_count, 1);

        // Stay below the silence timeout
        for _ in 0..(t.silence_us() / 50 - 1) {
            wire.advance_us(50);
            assert_eq!(rx.poll().unwrap(), 0);
            assert_eq!(rx.state(), ParseState::Framing);
            assert_eq!(rx.reference_us, reference);
            assert_eq!(rx.bit_count, 1);
            assert_eq!(rx.byte_count, 0);
            assert_eq!(rx.buffer()[0], 0x80);
        }
    }

    #[test]
    fn test_pin_error_leaves_decoder_untouched() {
        let wire = SimWire::new();
        let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);
        start_framing(&wire, &mut rx);
        let reference = rx.reference_us;

        wire.set_pin_error(ErrorKind::Other);
        wire.advance_us(50);
        wire.drive(false);
        assert!(matches!(rx.poll(), Err(LinkError::Pin(ErrorKind::Other))));
        assert!(matches!(rx.has_data(), Err(LinkError::Pin(_))));
        assert_eq!(rx.state(), ParseState::Framing);
        assert_eq!(rx.reference_us, reference);
        assert_eq!(rx.bit_count, 1);
        assert!(rx.prev_level);

        // The edge is seen once the pin reads again
        wire.clear_pin_error();
        assert_eq!(rx.poll().unwrap(), 0);
        assert!(!rx.prev_level);
    }

    #[test]
    fn test_has_data_is_edge_triggered() {
        let wire = SimWire::new();
        let payload = [0xDE, 0xAD];
        let mut frame = payload.to_vec();
        frame.push(crc8(&payload));
        drive_frame(&wire, &frame);

        let mut rx = receiver(&wire, ChecksumMode::Crc8, DEFAULT_BUFFER_CAPACITY);
        let end = wire.end_ns() + 3 * rx.timing().silence_us() as u64 * 1_000;
        wire.rewind();

        let mut hits = 0;
        while wire.now_ns() < end {
            if rx.has_data().unwrap() {
                hits += 1;
            }
            wire.advance_us(10);
        }
        assert_eq!(hits, 1);
        assert!(!rx.has_data().unwrap());
        assert_eq!(rx.payload(), &payload);
    }

    #[test]
    fn test_poll_blocking_until_frame_closes() {
        let payload = [0x01, 0x02, 0x03];
        let mut frame = payload.to_vec();
        frame.push(crc8(&payload));

        for (corrupt, expected) in [(false, 3), (true, 0)] {
            let wire = SimWire::new();
            let mut sent = frame.clone();
            if corrupt {
                sent[1] ^= 0x40;
            }
            drive_frame(&wire, &sent);
            wire.rewind();

            let link = LinkConfig::default();
            let mut rx = Receiver::new(wire.rx_pin(), wire.clock().stepping(10), &link, DEFAULT_BUFFER_CAPACITY)
                .unwrap();

            // Not framing yet: returns after a single poll
            assert_eq!(rx.poll_blocking().unwrap(), 0);

            while rx.state() != ParseState::Framing {
                assert!(wire.now_ns() < wire.end_ns(), "start marker never seen");
                rx.poll().unwrap();
            }

            assert_eq!(rx.poll_blocking().unwrap(), expected);
            assert_eq!(rx.state(), ParseState::Idle);
            assert_eq!(rx.size(), expected);
        }
    }

    #[test]
    fn test_read_into() {
        let wire = SimWire::new();
        let rx = receiver(&wire, ChecksumMode::Crc8, 4);

        let mut small = 0xFFFFu16;
        assert!(rx.read_into(&mut small));
        assert_eq!(small, 0);

        let mut large = 0u64;
        assert!(!rx.read_into(&mut large));

        match rx.read_record::<u64>() {
            Err(LinkError::RecordTooLarge { size, capacity }) => {
                assert_eq!(size, 8);
                assert_eq!(capacity, 4);
            }
            other => panic!("Expected RecordTooLarge, got: {:?}", other),
        }
    }

    #[test]
    fn test_reference_survives_counter_wrap() {
        let wire = SimWire::new();
        let payload = [0x04, 0x03, 0x02, 0x01];
        let mut frame = payload.to_vec();
        frame.push(crc8(&payload));
        drive_frame(&wire, &frame);

        // Counter wraps in the middle of the data section
        let wrap_at_us = (wire.end_ns() / 1_000) as u32 / 2;
        let link = LinkConfig::default();
        let mut rx = Receiver::new(
            wire.rx_pin(),
            wire.clock_with(u32::MAX - wrap_at_us, 0),
            &link,
            DEFAULT_BUFFER_CAPACITY,
        )
        .unwrap();

        let end = wire.end_ns() + 3 * rx.timing().silence_us() as u64 * 1_000;
        wire.rewind();
        let mut accepted = Vec::new();
        while wire.now_ns() < end {
            let size = rx.poll().unwrap();
            if size > 0 {
                accepted.push(size);
            }
            wire.advance_us(7);
        }

        assert_eq!(accepted, vec![4]);
        assert_eq!(rx.read_record::<u32>().unwrap(), 0x0102_0304);
    }
}
