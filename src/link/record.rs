//! # Record Serialization
//!
//! The link moves raw bytes. Application records cross it through
//! [`WireRecord`], an explicit fixed-size byte encoding.
//!
//! Implementations are provided for the primitive integer and float types
//! (little-endian), `bool` and byte arrays. Structs implement the trait by
//! laying out their fields in a fixed order.
//!
//! ```
//! use rf433_link::link::record::WireRecord;
//!
//! #[derive(Debug, PartialEq, Default)]
//! struct Reading {
//!     sensor: u8,
//!     value: i16,
//! }
//!
//! impl WireRecord for Reading {
//!     const WIRE_SIZE: usize = 3;
//!
//!     fn encode(&self, out: &mut [u8]) {
//!         out[0] = self.sensor;
//!         self.value.encode(&mut out[1..3]);
//!     }
//!
//!     fn decode(bytes: &[u8]) -> Self {
//!         Self { sensor: bytes[0], value: i16::decode(&bytes[1..3]) }
//!     }
//! }
//!
//! let mut buf = [0u8; 3];
//! Reading { sensor: 7, value: -2 }.encode(&mut buf);
//! assert_eq!(Reading::decode(&buf), Reading { sensor: 7, value: -2 });
//! ```

/// Fixed-size byte encoding of a record
pub trait WireRecord: Sized {
    /// Encoded size in bytes
    const WIRE_SIZE: usize;

    /// Write the record into `out`, which is exactly `WIRE_SIZE` bytes long
    fn encode(&self, out: &mut [u8]);

    /// Rebuild a record from exactly `WIRE_SIZE` bytes
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_wire_record_le {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireRecord for $ty {
                const WIRE_SIZE: usize = std::mem::size_of::<$ty>();

                fn encode(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_wire_record_le!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl WireRecord for bool {
    const WIRE_SIZE: usize = 1;

    fn encode(&self, out: &mut [u8]) {
        out[0] = *self as u8;
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl<const N: usize> WireRecord for [u8; N] {
    const WIRE_SIZE: usize = N;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(self);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0u8; N];
        raw.copy_from_slice(bytes);
        raw
    }
}
