//! # Frame Checksums
//!
//! CRC8 (Dallas/Maxim, reflected) and XOR checksums over the frame payload.
//!
//! **Polynomial**: 0x8C (0x31 reflected, LSB first)
//! **Initial Value**: 0x00
//!
//! Both checksums are self-verifying: running them over `payload ++ [checksum]`
//! yields zero, which is how the receiver accepts a frame.

use serde::Deserialize;

/// Reflected CRC8 polynomial
const CRC8_POLY: u8 = 0x8C;

/// Precomputed CRC8 lookup table
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x01) != 0 {
                crc = (crc >> 1) ^ CRC8_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Feed one byte into a running CRC8
pub fn crc8_update(crc: u8, byte: u8) -> u8 {
    let mut crc = crc;
    let mut data = byte;

    for _ in 0..8 {
        crc = if (crc ^ data) & 0x01 != 0 {
            (crc >> 1) ^ CRC8_POLY
        } else {
            crc >> 1
        };
        data >>= 1;
    }

    crc
}

/// Calculate CRC8 checksum with the portable bit loop
///
/// # Examples
///
/// ```
/// use rf433_link::link::crc::crc8;
///
/// let payload = [0x04, 0x03, 0x02, 0x01];
/// let crc = crc8(&payload);
/// assert_eq!(crc8(&[0x04, 0x03, 0x02, 0x01, crc]), 0);
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &byte| crc8_update(crc, byte))
}

/// Calculate CRC8 checksum using the lookup table
///
/// Same contract as [`crc8`]; trades 256 bytes of flash for speed.
pub fn crc8_table(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }

    crc
}

/// Calculate XOR checksum
pub fn crc_xor(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &byte| acc ^ byte)
}

/// Frame integrity check, must match on both ends of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// One CRC8 byte
    #[default]
    Crc8,

    /// One XOR byte
    Xor,

    /// No checksum byte
    #[serde(rename = "none")]
    Disabled,
}

impl ChecksumMode {
    /// Number of checksum bytes appended to each frame
    pub fn len(&self) -> usize {
        match self {
            ChecksumMode::Crc8 | ChecksumMode::Xor => 1,
            ChecksumMode::Disabled => 0,
        }
    }

    /// True if no checksum byte is carried
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checksum byte for a payload, `None` when disabled
    pub fn compute(&self, payload: &[u8]) -> Option<u8> {
        match self {
            ChecksumMode::Crc8 => Some(crc8_fast_or_portable(payload)),
            ChecksumMode::Xor => Some(crc_xor(payload)),
            ChecksumMode::Disabled => None,
        }
    }

    /// Verify a received frame (payload followed by its checksum byte)
    pub fn verify(&self, frame: &[u8]) -> bool {
        match self {
            ChecksumMode::Crc8 => crc8_fast_or_portable(frame) == 0,
            ChecksumMode::Xor => crc_xor(frame) == 0,
            ChecksumMode::Disabled => true,
        }
    }
}

#[cfg(feature = "crc-table")]
fn crc8_fast_or_portable(data: &[u8]) -> u8 {
    crc8_table(data)
}

#[cfg(not(feature = "crc-table"))]
fn crc8_fast_or_portable(data: &[u8]) -> u8 {
    crc8(data)
}
