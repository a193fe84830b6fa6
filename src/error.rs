//! Unified error types for the controller core.
//!
//! A single `Error` enum that every subsystem funnels into.  Variants map
//! onto negative errno codes, which is what travels in a protocol error
//! reply, so host tooling sees the same numbers regardless of which layer
//! failed.  All variants are `Copy` so they pass through ISR paths and
//! event payloads without allocation.

use core::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    /// Argument out of range, wrong payload length, malformed record.
    InvalidArgument,
    /// No such record, command or handler.
    NotFound,
    /// The access table has no free slot.
    NoSpace,
    /// A fixed-capacity queue or registry is full.
    QueueFull,
    /// The resource is already in use (sequence running, link busy).
    Busy,
    /// Frame length exceeds the maximum payload.
    TooBig,
    /// Frame checksum mismatch.
    Checksum,
    /// The credential reader is not connected.
    NoDevice,
    /// A record or handler with the same identity already exists.
    AlreadyExists,
    /// The backing store or serial driver reported a failure.
    Io,
}

impl Error {
    /// Positive errno value for this error.
    pub const fn errno(self) -> u8 {
        match self {
            Self::NotFound => 2,
            Self::Io => 5,
            Self::TooBig => 7,
            Self::QueueFull => 12,
            Self::Busy => 16,
            Self::AlreadyExists => 17,
            Self::NoDevice => 19,
            Self::InvalidArgument => 22,
            Self::NoSpace => 28,
            Self::Checksum => 74,
        }
    }

    /// Signed wire code carried in an error reply (`-errno`).
    pub const fn code(self) -> i8 {
        -(self.errno() as i8)
    }

    /// Map a wire code back to an error.  Unknown codes yield `None`.
    pub const fn from_code(code: i8) -> Option<Self> {
        Some(match code {
            -2 => Self::NotFound,
            -5 => Self::Io,
            -7 => Self::TooBig,
            -12 => Self::QueueFull,
            -16 => Self::Busy,
            -17 => Self::AlreadyExists,
            -19 => Self::NoDevice,
            -22 => Self::InvalidArgument,
            -28 => Self::NoSpace,
            -74 => Self::Checksum,
            _ => return None,
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotFound => write!(f, "not found"),
            Self::NoSpace => write!(f, "no space left"),
            Self::QueueFull => write!(f, "queue full"),
            Self::Busy => write!(f, "busy"),
            Self::TooBig => write!(f, "frame too big"),
            Self::Checksum => write!(f, "checksum mismatch"),
            Self::NoDevice => write!(f, "no device"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reader faults
// ---------------------------------------------------------------------------

/// Faults raised by a credential reader.  Delivered as event payloads and
/// treated by the door state machine as a deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReaderFault {
    /// Both data lines are low: the reader is unplugged or unpowered.
    Disconnected,
    /// A word of unsupported length, bad parity or out-of-range key.
    InvalidFrame { bits: u8 },
}

impl fmt::Display for ReaderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "reader disconnected"),
            Self::InvalidFrame { bits } => write!(f, "invalid {bits}-bit frame"),
        }
    }
}

impl From<ReaderFault> for Error {
    fn from(e: ReaderFault) -> Self {
        match e {
            ReaderFault::Disconnected => Self::NoDevice,
            ReaderFault::InvalidFrame { .. } => Self::InvalidArgument,
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
