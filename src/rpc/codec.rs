//! Byte-stuffed frame codec for the serial control link.
//!
//! Wire format:
//! ```text
//! ┌──────┬──────┬─────┬──────────────────┬────────────────┐
//! │ 0x7E │ TYPE │ LEN │ PAYLOAD (0..=16) │ CRC16 (LE u16) │
//! └──────┴──────┴─────┴──────────────────┴────────────────┘
//!          └──────────── escaped, CRC covers ───┘
//! ```
//!
//! Every byte after the start byte is escaped: `0x7E` and `0x7D` go out
//! as `0x7D, byte ^ 0x20`.  The CRC is CRC-16/XMODEM over the unescaped
//! TYPE, LEN and PAYLOAD and is itself escaped.  A start byte anywhere
//! resynchronises the decoder, so a torn frame costs at most one message.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const START: u8 = 0x7E;
pub const ESC: u8 = 0x7D;
const ESC_XOR: u8 = 0x20;

/// Largest message payload.
pub const MAX_PAYLOAD: usize = 16;

/// Worst-case encoded frame: start byte plus every other byte escaped.
pub const MAX_FRAME_SIZE: usize = 1 + (2 + MAX_PAYLOAD + 2) * 2;

/// Message type 0: success reply.
pub const KIND_OK: u8 = 0;
/// Message type 255: error reply carrying one `i8` error code.
pub const KIND_ERROR: u8 = 255;
/// First unsolicited event type.
pub const FIRST_EVENT: u8 = 127;

// ── CRC ─────────────────────────────────────────────────────────

/// One byte of CRC-16/XMODEM (poly 0x1021, init 0).
pub const fn crc16_update(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ ((byte as u16) << 8);
    let mut i = 0;
    while i < 8 {
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ 0x1021
        } else {
            crc << 1
        };
        i += 1;
    }
    crc
}

pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0, |crc, &b| crc16_update(crc, b))
}

// ── Message ─────────────────────────────────────────────────────

/// What a message type means on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Ok,
    Error,
    Command,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: u8,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

impl Message {
    pub fn new(kind: u8, payload: &[u8]) -> Result<Self> {
        Ok(Self {
            kind,
            payload: Vec::from_slice(payload).map_err(|_| Error::TooBig)?,
        })
    }

    pub fn ok(payload: &[u8]) -> Result<Self> {
        Self::new(KIND_OK, payload)
    }

    /// Error reply: a single byte, the negative errno.
    pub fn error(err: Error) -> Self {
        let mut payload = Vec::new();
        // Capacity is 16; one byte always fits.
        let _ = payload.push(err.code() as u8);
        Self {
            kind: KIND_ERROR,
            payload,
        }
    }

    pub fn event(kind: u8, payload: &[u8]) -> Result<Self> {
        if kind < FIRST_EVENT || kind == KIND_ERROR {
            return Err(Error::InvalidArgument);
        }
        Self::new(kind, payload)
    }

    pub const fn class(&self) -> MessageClass {
        match self.kind {
            KIND_OK => MessageClass::Ok,
            KIND_ERROR => MessageClass::Error,
            k if k < FIRST_EVENT => MessageClass::Command,
            _ => MessageClass::Event,
        }
    }

    /// Decoded error of an error reply.
    pub fn error_code(&self) -> Option<Error> {
        match (self.class(), self.payload.as_slice()) {
            (MessageClass::Error, [code]) => Error::from_code(*code as i8),
            _ => None,
        }
    }
}

// ── Encoder ─────────────────────────────────────────────────────

struct Writer<'a> {
    out: &'a mut [u8],
    pos: usize,
    crc: u16,
}

impl Writer<'_> {
    fn raw(&mut self, byte: u8) -> Result<()> {
        let slot = self.out.get_mut(self.pos).ok_or(Error::TooBig)?;
        *slot = byte;
        self.pos += 1;
        Ok(())
    }

    fn escaped(&mut self, byte: u8) -> Result<()> {
        if byte == START || byte == ESC {
            self.raw(ESC)?;
            self.raw(byte ^ ESC_XOR)
        } else {
            self.raw(byte)
        }
    }

    fn body(&mut self, byte: u8) -> Result<()> {
        self.crc = crc16_update(self.crc, byte);
        self.escaped(byte)
    }
}

/// Encode `msg` into `out`.  Returns the frame length, or `TooBig` when
/// `out` cannot hold it.  [`MAX_FRAME_SIZE`] bytes always suffice.
pub fn encode_frame(msg: &Message, out: &mut [u8]) -> Result<usize> {
    let mut w = Writer { out, pos: 0, crc: 0 };
    w.raw(START)?;
    w.body(msg.kind)?;
    w.body(msg.payload.len() as u8)?;
    for &b in &msg.payload {
        w.body(b)?;
    }
    for b in w.crc.to_le_bytes() {
        w.escaped(b)?;
    }
    Ok(w.pos)
}

// ── Decoder ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rx {
    Sync,
    Type,
    Length,
    Payload,
    Crc,
}

/// Streaming frame decoder, fed one byte at a time from the RX ISR.
pub struct FrameDecoder {
    state: Rx,
    escape: bool,
    kind: u8,
    len: u8,
    pos: u8,
    crc: u16,
    wire_crc: [u8; 2],
    payload: Vec<u8, MAX_PAYLOAD>,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            state: Rx::Sync,
            escape: false,
            kind: 0,
            len: 0,
            pos: 0,
            crc: 0,
            wire_crc: [0; 2],
            payload: Vec::new(),
        }
    }

    /// Drop any partial frame and wait for a start byte.
    pub fn reset(&mut self) {
        self.state = Rx::Sync;
        self.escape = false;
    }

    /// Between frames.  Unsolicited output is only safe in this state.
    pub fn is_idle(&self) -> bool {
        self.state == Rx::Sync
    }

    /// Feed one received byte.  Yields a result once a frame's CRC has
    /// arrived: the message, `TooBig` for an over-long payload or
    /// `Checksum` for a CRC mismatch.
    pub fn push(&mut self, byte: u8) -> Option<Result<Message>> {
        if byte == START {
            self.state = Rx::Type;
            self.escape = false;
            self.crc = 0;
            self.pos = 0;
            self.payload.clear();
            return None;
        }
        if self.state == Rx::Sync {
            return None;
        }

        let byte = if self.escape {
            self.escape = false;
            byte ^ ESC_XOR
        } else if byte == ESC {
            self.escape = true;
            return None;
        } else {
            byte
        };

        if self.state != Rx::Crc {
            self.crc = crc16_update(self.crc, byte);
        }

        match self.state {
            Rx::Sync => None,
            Rx::Type => {
                self.kind = byte;
                self.state = Rx::Length;
                None
            }
            Rx::Length => {
                self.len = byte;
                self.pos = 0;
                self.state = if byte > 0 { Rx::Payload } else { Rx::Crc };
                None
            }
            Rx::Payload => {
                // Bytes past the buffer are counted but dropped.
                let _ = self.payload.push(byte);
                self.pos += 1;
                if self.pos >= self.len {
                    self.pos = 0;
                    self.state = Rx::Crc;
                }
                None
            }
            Rx::Crc => {
                self.wire_crc[self.pos as usize] = byte;
                self.pos += 1;
                if (self.pos as usize) < self.wire_crc.len() {
                    return None;
                }
                self.state = Rx::Sync;
                Some(self.finish())
            }
        }
    }

    fn finish(&mut self) -> Result<Message> {
        if self.len as usize > MAX_PAYLOAD {
            return Err(Error::TooBig);
        }
        if u16::from_le_bytes(self.wire_crc) != self.crc {
            return Err(Error::Checksum);
        }
        Ok(Message {
            kind: self.kind,
            payload: core::mem::take(&mut self.payload),
        })
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
