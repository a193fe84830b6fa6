//! Wiegand credential decoder.
//!
//! ## Hardware
//!
//! Two open-collector data lines, D0 and D1, idle high.  A `0` bit is a
//! short low pulse on D0, a `1` bit a low pulse on D1.  The edge ISR for
//! either line calls [`WiegandReader::on_edge`] with the new level.
//!
//! ## Line states
//!
//! | D1 D0 | State | Action                                          |
//! |-------|-------|-------------------------------------------------|
//! | 0  0  | 0     | reader gone: fault event, accumulator reset     |
//! | 0  1  | 1     | D1 pulse: store `1` at the current bit index     |
//! | 1  0  | 2     | D0 pulse: store `0` at the current bit index     |
//! | 1  1  | 3     | gap: advance bit index, arm the word timer       |
//!
//! When the lines have been quiet for [`WORD_TIMEOUT_MS`] the word timer
//! fires and [`WiegandReader::on_timeout`] decodes the accumulated bits.
//!
//! ## Frames
//!
//! | Bits | Meaning                                                    |
//! |------|------------------------------------------------------------|
//! | 4    | keypad key, first bit is MSB                               |
//! | 8    | keypad key followed by its bitwise complement              |
//! | 26   | even parity, 24-bit card number (MSB first), odd parity    |

use core::cell::RefCell;

use critical_section::Mutex;
use log::{debug, info, warn};

use crate::config::WORD_TIMEOUT_MS;
use crate::error::{ReaderFault, Result};
use crate::events::{Payload, SourceId};
use crate::runtime::Runtime;
use crate::timer::TimerHandle;

/// Bits kept per word.  Longer words are still counted.
pub const MAX_BITS: u8 = 40;

pub const KEY_ESC: u8 = 0x0A;
pub const KEY_ENTER: u8 = 0x0B;

/// 26-bit frame layout.
const CARD_BITS: u8 = 26;
const EVEN_PARITY_SPAN: (u8, u8) = (1, 8);
const ODD_PARITY_SPAN: (u8, u8) = (9, 24);

/// Data line identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    D0,
    D1,
}

/// A successfully decoded word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Key(u8),
    Card(u32),
}

impl From<Credential> for Payload {
    fn from(c: Credential) -> Self {
        match c {
            Credential::Key(k) => Self::Key(k),
            Credential::Card(c) => Self::Card(c),
        }
    }
}

// ── Pure decoding ─────────────────────────────────────────────

/// Bit `i` in reception order.
fn bit(bits: u64, i: u8) -> bool {
    (bits >> i) & 1 != 0
}

fn ones(bits: u64, from: u8, to: u8) -> u32 {
    (from..=to).filter(|&i| bit(bits, i)).count() as u32
}

fn decode_key(bits: u64, len: u8) -> core::result::Result<Credential, ReaderFault> {
    let key = (0..4).fold(0u8, |acc, i| (acc << 1) | bit(bits, i) as u8);
    if key > KEY_ENTER {
        return Err(ReaderFault::InvalidFrame { bits: len });
    }
    Ok(Credential::Key(key))
}

/// Decode `count` bits stored in reception order (bit 0 first).
pub fn decode(bits: u64, count: u8) -> core::result::Result<Credential, ReaderFault> {
    let invalid = ReaderFault::InvalidFrame { bits: count };
    match count {
        4 => decode_key(bits, count),
        8 => {
            let low = (bits & 0x0F) as u8;
            let high = ((bits >> 4) & 0x0F) as u8;
            if low != !high & 0x0F {
                return Err(invalid);
            }
            decode_key(bits, count)
        }
        CARD_BITS => {
            let (even_from, even_to) = EVEN_PARITY_SPAN;
            let (odd_from, odd_to) = ODD_PARITY_SPAN;
            let even_ok = (ones(bits, even_from, even_to) + bit(bits, 0) as u32) % 2 == 0;
            let odd_ok = (ones(bits, odd_from, odd_to) + bit(bits, CARD_BITS - 1) as u32) % 2 == 1;
            if !(even_ok && odd_ok) {
                return Err(invalid);
            }
            let card = (1..=24).fold(0u32, |acc, i| (acc << 1) | bit(bits, i) as u32);
            Ok(Credential::Card(card))
        }
        _ => Err(invalid),
    }
}

/// Build the 26-bit frame for `card` in reception order.  Used by test
/// rigs and reader simulators.
pub fn encode_card(card: u32) -> u64 {
    let mut bits = 0u64;
    for i in 0..24u8 {
        if (card >> (23 - i)) & 1 != 0 {
            bits |= 1 << (i + 1);
        }
    }
    let (even_from, even_to) = EVEN_PARITY_SPAN;
    let (odd_from, odd_to) = ODD_PARITY_SPAN;
    if ones(bits, even_from, even_to) % 2 == 1 {
        bits |= 1;
    }
    if ones(bits, odd_from, odd_to) % 2 == 0 {
        bits |= 1 << (CARD_BITS - 1);
    }
    bits
}

/// Build the 4-bit keypad frame for `key` in reception order.
pub fn encode_key(key: u8) -> u64 {
    (0..4u8).fold(0u64, |acc, i| acc | (((key >> (3 - i)) & 1) as u64) << i)
}

// ── Edge-driven accumulator ───────────────────────────────────

struct Accumulator {
    bits: u64,
    count: u8,
    /// Bit 0 = D0 level, bit 1 = D1 level.
    lines: u8,
    faulted: bool,
}

impl Accumulator {
    const fn new() -> Self {
        Self {
            bits: 0,
            count: 0,
            lines: 0b11,
            faulted: false,
        }
    }

    fn store(&mut self, value: bool) {
        if self.count >= MAX_BITS {
            return;
        }
        let mask = 1u64 << self.count;
        if value {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
    }

    fn reset(&mut self) {
        self.bits = 0;
        self.count = 0;
    }
}

enum EdgeAction {
    None,
    ArmTimer,
    Fault,
}

/// One Wiegand reader.  Shared between the edge ISRs and the main loop.
pub struct WiegandReader {
    source: SourceId,
    timer: TimerHandle,
    acc: Mutex<RefCell<Accumulator>>,
}

impl WiegandReader {
    pub fn new<K: Copy + PartialEq>(rt: &Runtime<K>) -> Result<Self> {
        Ok(Self {
            source: rt.allocate_source()?,
            timer: rt.allocate_timer()?,
            acc: Mutex::new(RefCell::new(Accumulator::new())),
        })
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn timer(&self) -> TimerHandle {
        self.timer
    }

    /// Seed the line shadow from the pins at boot.
    pub fn init_lines(&self, d0: bool, d1: bool) {
        critical_section::with(|cs| {
            let mut acc = self.acc.borrow_ref_mut(cs);
            acc.lines = (d0 as u8) | ((d1 as u8) << 1);
            acc.faulted = acc.lines == 0;
            acc.reset();
        });
    }

    pub fn is_connected(&self) -> bool {
        critical_section::with(|cs| !self.acc.borrow_ref(cs).faulted)
    }

    /// Edge ISR entry.  `level` is the new level of `line`.
    pub fn on_edge<K: Copy + PartialEq>(&self, rt: &Runtime<K>, line: Line, level: bool) {
        let action = critical_section::with(|cs| {
            let mut acc = self.acc.borrow_ref_mut(cs);
            let bit = match line {
                Line::D0 => 0b01,
                Line::D1 => 0b10,
            };
            if level {
                acc.lines |= bit;
            } else {
                acc.lines &= !bit;
            }

            match acc.lines {
                0 => {
                    acc.reset();
                    if acc.faulted {
                        EdgeAction::None
                    } else {
                        acc.faulted = true;
                        EdgeAction::Fault
                    }
                }
                _ if acc.faulted => {
                    if acc.lines == 0b11 {
                        acc.faulted = false;
                        acc.reset();
                    }
                    EdgeAction::None
                }
                0b01 => {
                    acc.store(true);
                    EdgeAction::None
                }
                0b10 => {
                    acc.store(false);
                    EdgeAction::None
                }
                _ => {
                    acc.count = acc.count.saturating_add(1);
                    EdgeAction::ArmTimer
                }
            }
        });

        match action {
            EdgeAction::None => {}
            EdgeAction::ArmTimer => rt.schedule_in(self.timer, WORD_TIMEOUT_MS),
            EdgeAction::Fault => {
                rt.deschedule(self.timer);
                // No caller to report a full pool to from ISR context.
                let _ = rt.post(self.source, Payload::ReaderFault(ReaderFault::Disconnected));
            }
        }
    }

    /// Word timer expiry.  Decodes the accumulated bits and posts the result.
    pub fn on_timeout<K: Copy + PartialEq>(&self, rt: &Runtime<K>) {
        let (bits, count, faulted) = critical_section::with(|cs| {
            let mut acc = self.acc.borrow_ref_mut(cs);
            let snapshot = (acc.bits, acc.count, acc.faulted);
            acc.reset();
            snapshot
        });
        if faulted {
            return;
        }

        let payload = match decode(bits, count) {
            Ok(credential) => {
                debug!("wiegand: {}-bit word -> {:?}", count, credential);
                Payload::from(credential)
            }
            Err(fault) => {
                info!("wiegand: rejected word: {}", fault);
                Payload::ReaderFault(fault)
            }
        };
        if rt.post(self.source, payload).is_err() {
            warn!("wiegand: event pool full, {:?} lost", payload);
        }
    }
}
