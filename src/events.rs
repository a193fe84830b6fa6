//! Event mailbox and handler registry.
//!
//! Events are produced by:
//! - Edge ISRs (Wiegand bit decoding faults, exit button)
//! - Timer callbacks (completed Wiegand words, sequencer completion, idle timeout)
//! - The serial link (frame received, transmission complete)
//!
//! Events are consumed by the dispatch loop, one at a time in FIFO order,
//! and delivered to every handler registered for the event's source.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Edge ISR    │────▶│              │     │              │
//! │ UART ISR    │────▶│  EventQueue  │────▶│ HandlerTable │──▶ Dispatch
//! │ Timer cb    │────▶│  (8 slots)   │     │ (source,id)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::num::NonZeroU8;

use heapless::{Deque, Vec};

use crate::error::{Error, ReaderFault, Result};

/// Identity of an event producer.  Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(NonZeroU8);

impl SourceId {
    pub const fn new(raw: u8) -> Option<Self> {
        match NonZeroU8::new(raw) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    pub const fn get(self) -> u8 {
        self.0.get()
    }
}

/// Typed event body.  The 8-bit event id is derived from the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    // ── Credential reader ─────────────────────────────────
    /// Keypad key 0–9, `0xA` (Esc/`*`) or `0xB` (Enter/`#`).
    Key(u8),
    /// 24-bit card number.
    Card(u32),
    ReaderFault(ReaderFault),

    // ── Door controller ───────────────────────────────────
    IdleTimeout,
    OpenFinished,
    BuzzerFinished,

    // ── Debounced input ───────────────────────────────────
    /// New settled level, `true` = active.
    Input(bool),

    // ── Serial link ───────────────────────────────────────
    FrameReceived,
    TransmitDone,
}

impl Payload {
    pub const KEY: u8 = 0x00;
    pub const CARD: u8 = 0x01;
    pub const READER_FAULT: u8 = 0x0F;
    pub const IDLE_TIMEOUT: u8 = 0x10;
    pub const OPEN_FINISHED: u8 = 0x11;
    pub const BUZZER_FINISHED: u8 = 0x12;
    pub const INPUT: u8 = 0x20;
    pub const FRAME_RECEIVED: u8 = 0x30;
    pub const TRANSMIT_DONE: u8 = 0x31;

    pub const fn id(&self) -> u8 {
        match self {
            Self::Key(_) => Self::KEY,
            Self::Card(_) => Self::CARD,
            Self::ReaderFault(_) => Self::READER_FAULT,
            Self::IdleTimeout => Self::IDLE_TIMEOUT,
            Self::OpenFinished => Self::OPEN_FINISHED,
            Self::BuzzerFinished => Self::BUZZER_FINISHED,
            Self::Input(_) => Self::INPUT,
            Self::FrameReceived => Self::FRAME_RECEIVED,
            Self::TransmitDone => Self::TRANSMIT_DONE,
        }
    }
}

/// A queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub source: SourceId,
    pub payload: Payload,
}

impl Event {
    pub const fn new(source: SourceId, payload: Payload) -> Self {
        Self { source, payload }
    }

    pub const fn id(&self) -> u8 {
        self.payload.id()
    }
}

// ── Event pool ────────────────────────────────────────────────

/// Fixed-capacity FIFO of pending events.
pub struct EventQueue<const N: usize> {
    pending: Deque<Event, N>,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            pending: Deque::new(),
        }
    }

    /// Append an event.  A full pool drops it.
    pub fn push(&mut self, event: Event) -> Result<()> {
        self.pending.push_back(event).map_err(|_| Error::QueueFull)
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.pending.pop_front()
    }

    /// Drop every queued event from `source` with id `id`.  Returns the count.
    pub fn remove(&mut self, source: SourceId, id: u8) -> usize {
        let mut removed = 0;
        for _ in 0..self.pending.len() {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            if event.source == source && event.id() == id {
                removed += 1;
            } else {
                // Re-queued events fit: we just took one out.
                let _ = self.pending.push_back(event);
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pending.is_full()
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Handler registry ──────────────────────────────────────────

/// Restricts a handler to ids where `id & mask == self.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdFilter {
    pub mask: u8,
    pub id: u8,
}

impl IdFilter {
    pub const fn exact(id: u8) -> Self {
        Self { mask: 0xFF, id }
    }

    pub const fn matches(self, id: u8) -> bool {
        id & self.mask == self.id
    }
}

/// Subscription of `target` to events from `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler<K> {
    pub source: SourceId,
    pub filter: Option<IdFilter>,
    pub target: K,
}

impl<K> Handler<K> {
    pub const fn new(source: SourceId, target: K) -> Self {
        Self {
            source,
            filter: None,
            target,
        }
    }

    #[must_use]
    pub const fn with_filter(mut self, filter: IdFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.source == self.source && self.filter.is_none_or(|f| f.matches(event.id()))
    }
}

/// Registered handlers in registration order.
pub struct HandlerTable<K, const N: usize> {
    handlers: Vec<Handler<K>, N>,
}

impl<K: Copy + PartialEq, const N: usize> HandlerTable<K, N> {
    pub const fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a handler.  Identity is `(source, target)`.
    pub fn add(&mut self, handler: Handler<K>) -> Result<()> {
        if self
            .handlers
            .iter()
            .any(|h| h.source == handler.source && h.target == handler.target)
        {
            return Err(Error::AlreadyExists);
        }
        self.handlers.push(handler).map_err(|_| Error::NoSpace)
    }

    pub fn remove(&mut self, source: SourceId, target: K) -> Result<()> {
        let pos = self
            .handlers
            .iter()
            .position(|h| h.source == source && h.target == target)
            .ok_or(Error::NotFound)?;
        self.handlers.remove(pos);
        Ok(())
    }

    /// Targets of every handler matching `event`, in registration order.
    pub fn matching(&self, event: &Event) -> Vec<K, N> {
        self.handlers
            .iter()
            .filter(|h| h.matches(event))
            .map(|h| h.target)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<K: Copy + PartialEq, const N: usize> Default for HandlerTable<K, N> {
    fn default() -> Self {
        Self::new()
    }
}
