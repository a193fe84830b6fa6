//! Serial control protocol.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Control link                            │
//! │                                                            │
//! │  UART RX ISR ──▶ SerialTransport ──▶ FrameReceived event   │
//! │                  (FrameDecoder)             │              │
//! │                                             ▼              │
//! │                                   CommandEngine            │
//! │                                   (→ AccessStore)          │
//! │                                             │              │
//! │  UART TX ◀── SerialPort::submit ◀── reply / event frames   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`codec`] is pure framing, [`transport`] the ISR-shared link state,
//! [`engine`] the request handling.

pub mod codec;
pub mod engine;
pub mod transport;
