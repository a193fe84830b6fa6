//! Access record layout.
//!
//! ```text
//!  byte:   0      1      2      3      4
//!        ┌──────┴──────┴──────┴──────┬───────────────────────┐
//!        │ key (u32, little-endian)  │ doors │U│I│ kind (2)  │
//!        └───────────────────────────┴───────────────────────┘
//!                                     7   4  3 2  1       0
//! ```
//!
//! `I` marks the slot invalid, so erased memory (`0xFF`) reads as a free
//! slot.  `U` is set the first time the record opens a door.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const RECORD_SIZE: usize = 5;

const KIND_MASK: u8 = 0b0000_0011;
const INVALID_BIT: u8 = 0b0000_0100;
const USED_BIT: u8 = 0b0000_1000;
const DOORS_SHIFT: u8 = 4;

/// Credential kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccessKind {
    None = 0,
    Pin = 1,
    Card = 2,
    CardAndPin = 3,
}

impl AccessKind {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & KIND_MASK {
            1 => Self::Pin,
            2 => Self::Card,
            3 => Self::CardAndPin,
            _ => Self::None,
        }
    }
}

/// One credential with the doors it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub key: u32,
    pub kind: AccessKind,
    /// Bit `n` grants door `n`.  Only the low four bits are stored.
    pub doors: u8,
    pub used: bool,
}

impl AccessRecord {
    /// The free-slot record.
    pub const NONE: Self = Self {
        key: 0,
        kind: AccessKind::None,
        doors: 0,
        used: false,
    };

    pub const fn new(kind: AccessKind, key: u32, doors: u8) -> Self {
        Self {
            key,
            kind,
            doors: doors & 0x0F,
            used: false,
        }
    }

    pub fn is_free(&self) -> bool {
        self.kind == AccessKind::None
    }

    pub fn matches(&self, kind: AccessKind, key: u32) -> bool {
        !self.is_free() && self.kind == kind && self.key == key
    }

    pub fn grants(&self, door_id: u8) -> bool {
        door_id < 4 && self.doors & (1 << door_id) != 0
    }

    /// Storage and wire form.
    pub fn pack(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[..4].copy_from_slice(&self.key.to_le_bytes());
        out[4] = (self.kind as u8)
            | if self.used { USED_BIT } else { 0 }
            | ((self.doors & 0x0F) << DOORS_SHIFT);
        out
    }

    /// Decode a stored record.  Invalid or kind-less slots read as [`Self::NONE`].
    pub fn unpack(raw: [u8; RECORD_SIZE]) -> Self {
        let flags = raw[4];
        let kind = AccessKind::from_bits(flags);
        if flags & INVALID_BIT != 0 || kind == AccessKind::None {
            return Self::NONE;
        }
        Self {
            key: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            kind,
            doors: flags >> DOORS_SHIFT,
            used: flags & USED_BIT != 0,
        }
    }

    /// Decode a record from a protocol payload.
    pub fn from_wire(raw: &[u8]) -> Result<Self> {
        let raw: [u8; RECORD_SIZE] = raw.try_into().map_err(|_| Error::InvalidArgument)?;
        Ok(Self::unpack(raw))
    }
}
