//! Serial link layer.
//!
//! Sits between the UART driver and the command engine.  The RX ISR feeds
//! bytes to [`SerialTransport::on_byte`]; the TX-complete ISR calls
//! [`SerialTransport::on_transmit_complete`].  Everything else runs in the
//! main loop.
//!
//! ```text
//!            frame decoded              reply submitted
//!  Receiving ─────────────▶ Servicing ─────────────────▶ Transmitting
//!      ▲                                                     │
//!      └──────────────────── TX complete ────────────────────┘
//! ```
//!
//! Input is only accepted while `Receiving`.  Unsolicited events go out
//! straight away when the link is `Receiving` with no frame half-read;
//! otherwise they wait in a small outbox and are flushed when the next
//! transmission completes, or on the main loop's next idle pass.  An
//! event stays in the outbox until the port has accepted it.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;
use log::warn;

use crate::app::ports::SerialPort;
use crate::config::MAX_QUEUED_EVENTS;
use crate::error::{Error, Result};
use crate::events::{Payload, SourceId};
use crate::runtime::Runtime;

use super::codec::{FrameDecoder, MAX_FRAME_SIZE, Message, encode_frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Receiving,
    /// A request is waiting for its reply.
    Servicing,
    Transmitting,
}

struct Inner {
    decoder: FrameDecoder,
    link: Link,
    request: Option<Result<Message>>,
    outbox: Deque<Message, MAX_QUEUED_EVENTS>,
}

pub struct SerialTransport {
    source: SourceId,
    inner: Mutex<RefCell<Inner>>,
}

impl SerialTransport {
    pub fn new<K: Copy + PartialEq>(rt: &Runtime<K>) -> Result<Self> {
        Ok(Self {
            source: rt.allocate_source()?,
            inner: Mutex::new(RefCell::new(Inner {
                decoder: FrameDecoder::new(),
                link: Link::Receiving,
                request: None,
                outbox: Deque::new(),
            })),
        })
    }

    /// Source of `FrameReceived` and `TransmitDone` events.
    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn link(&self) -> Link {
        critical_section::with(|cs| self.inner.borrow_ref(cs).link)
    }

    /// Events waiting in the outbox.
    pub fn queued(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).outbox.len())
    }

    // ── ISR entry points ──────────────────────────────────────

    /// RX interrupt: one received byte.
    pub fn on_byte<K: Copy + PartialEq>(&self, rt: &Runtime<K>, byte: u8) {
        let received = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.link != Link::Receiving {
                return false;
            }
            match inner.decoder.push(byte) {
                Some(request) => {
                    inner.request = Some(request);
                    inner.link = Link::Servicing;
                    true
                }
                None => false,
            }
        });
        if received && rt.post(self.source, Payload::FrameReceived).is_err() {
            // Nobody will ever reply; drop the request and listen again.
            warn!("serial: request dropped, event pool full");
            critical_section::with(|cs| {
                let mut inner = self.inner.borrow_ref_mut(cs);
                inner.request = None;
                inner.link = Link::Receiving;
            });
        }
    }

    /// TX-complete interrupt: the last submitted frame is out.
    pub fn on_transmit_complete<K: Copy + PartialEq>(&self, rt: &Runtime<K>) {
        let pending = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.link = Link::Receiving;
            !inner.outbox.is_empty()
        });
        if pending && rt.post(self.source, Payload::TransmitDone).is_err() {
            warn!("serial: flush deferred, event pool full");
        }
    }

    // ── Main loop ─────────────────────────────────────────────

    /// The request announced by the last `FrameReceived`: a message, or
    /// the decode error to report back.
    pub fn take_request(&self) -> Option<Result<Message>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).request.take())
    }

    /// Answer the pending request.  `InvalidArgument` if none is pending,
    /// `Busy` while a frame is still going out.
    pub fn reply(&self, serial: &mut impl SerialPort, msg: &Message) -> Result<()> {
        let mut frame = [0u8; MAX_FRAME_SIZE];
        let len = encode_frame(msg, &mut frame)?;
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            match inner.link {
                Link::Servicing => {
                    inner.link = Link::Transmitting;
                    Ok(())
                }
                Link::Receiving => Err(Error::InvalidArgument),
                Link::Transmitting => Err(Error::Busy),
            }
        })?;
        self.submit(serial, &frame[..len])
    }

    /// Send an unsolicited event now if the link is quiet, else queue it.
    pub fn send_event(&self, serial: &mut impl SerialPort, msg: Message) -> Result<()> {
        let mut frame = [0u8; MAX_FRAME_SIZE];
        let len = encode_frame(&msg, &mut frame)?;
        let now = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.link == Link::Receiving && inner.decoder.is_idle() && inner.outbox.is_empty() {
                inner.link = Link::Transmitting;
                Ok(true)
            } else {
                inner
                    .outbox
                    .push_back(msg.clone())
                    .map(|()| false)
                    .map_err(|_| Error::QueueFull)
            }
        })?;
        if now && self.submit(serial, &frame[..len]).is_err() {
            // Keep it for the next flush.
            critical_section::with(|cs| self.inner.borrow_ref_mut(cs).outbox.push_back(msg))
                .map_err(|_| Error::QueueFull)?;
        }
        Ok(())
    }

    /// Send the oldest queued event if the link is quiet.  `Ok(true)` if a
    /// frame went out.  A failed submit leaves the event queued.
    pub fn flush(&self, serial: &mut impl SerialPort) -> Result<bool> {
        let next = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.link != Link::Receiving || !inner.decoder.is_idle() {
                return None;
            }
            let msg = inner.outbox.front()?.clone();
            inner.link = Link::Transmitting;
            Some(msg)
        });
        let Some(msg) = next else {
            return Ok(false);
        };
        let mut frame = [0u8; MAX_FRAME_SIZE];
        let len = match encode_frame(&msg, &mut frame) {
            Ok(len) => len,
            Err(e) => {
                critical_section::with(|cs| {
                    let mut inner = self.inner.borrow_ref_mut(cs);
                    inner.outbox.pop_front();
                    inner.link = Link::Receiving;
                });
                return Err(e);
            }
        };
        self.submit(serial, &frame[..len])?;
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).outbox.pop_front());
        Ok(true)
    }

    fn submit(&self, serial: &mut impl SerialPort, frame: &[u8]) -> Result<()> {
        serial.submit(frame).inspect_err(|e| {
            warn!("serial: transmit failed: {}", e);
            critical_section::with(|cs| self.inner.borrow_ref_mut(cs).link = Link::Receiving);
        })
    }
}
