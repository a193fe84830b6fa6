//! Outbound application events.
//!
//! The [`Controller`](super::service::Controller) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to the console, count them,
//! blink a diagnostic LED.

use crate::error::{Error, ReaderFault};
use crate::fsm::states::DoorState;
use crate::timer::Millis;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// Boot finished; carries the number of doors and record slots.
    Started { doors: u8, records: u16 },

    /// A door moved between states.
    DoorStateChanged {
        door: u8,
        from: DoorState,
        to: DoorState,
    },

    /// A door's reader reported a fault.
    ReaderFault { door: u8, fault: ReaderFault },

    /// A door's open time was changed over the control link.
    OpenTimeChanged { door: u8, open_time: Millis },

    /// A control request was answered with an error.  `kind` is `None`
    /// when the frame itself could not be decoded.
    CommandFailed { kind: Option<u8>, error: Error },
}
