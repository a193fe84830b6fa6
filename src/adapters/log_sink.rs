//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing application events to the `log`
//! facade, one line per event.  The firmware binary installs the logger
//! backend (UART console on the board, `env_logger` style on the host).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { doors, records } => {
                info!("START | doors={} records={}", doors, records);
            }
            AppEvent::DoorStateChanged { door, from, to } => {
                info!("DOOR  | {} | {} -> {}", door, from.name(), to.name());
            }
            AppEvent::ReaderFault { door, fault } => {
                warn!("FAULT | door {} | {}", door, fault);
            }
            AppEvent::OpenTimeChanged { door, open_time } => {
                info!("CONF  | door {} | open_time={}ms", door, open_time);
            }
            AppEvent::CommandFailed { kind, error } => match kind {
                Some(kind) => warn!("CMD   | {} failed | {} ({})", kind, error, error.code()),
                None => warn!("CMD   | bad frame | {}", error),
            },
        }
    }
}
