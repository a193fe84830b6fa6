//! Port traits: the boundary between the controller core and the board.
//!
//! ```text
//!   Board driver ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! The board crate implements these for its EEPROM, UART and sleep
//! controller.  The [`Controller`](super::service::Controller) consumes
//! them via generics, so the core never touches hardware directly.
//! Output pins use `embedded_hal::digital::OutputPin` instead of a port
//! of their own.

use critical_section::CriticalSection;

use crate::error::Result;
use crate::store::AccessKind;

// ───────────────────────────────────────────────────────────────
// Non-volatile memory (driven adapter: domain ↔ EEPROM)
// ───────────────────────────────────────────────────────────────

/// Byte-addressable non-volatile memory.  Reads and writes are expected
/// to complete synchronously.
pub trait NvMemory {
    /// Size in bytes.
    fn capacity(&self) -> usize;

    /// Fill `buf` from `addr`.  Out-of-range access is `InvalidArgument`.
    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at `addr`.  Out-of-range access is `InvalidArgument`.
    fn write(&mut self, addr: usize, data: &[u8]) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Serial port (driven adapter: domain → UART)
// ───────────────────────────────────────────────────────────────

/// Transmit side of the control link.
///
/// `submit` hands a complete encoded frame to the driver, which copies it
/// and starts sending.  When the last byte is out, the driver's
/// TX-complete interrupt calls
/// [`SerialTransport::on_transmit_complete`](crate::rpc::transport::SerialTransport::on_transmit_complete).
/// Received bytes go to
/// [`SerialTransport::on_byte`](crate::rpc::transport::SerialTransport::on_byte).
pub trait SerialPort {
    fn submit(&mut self, frame: &[u8]) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Idle / low-power control
// ───────────────────────────────────────────────────────────────

/// Sleep control for the dispatch loop.
///
/// Every method runs inside the runtime's critical section, after it has
/// seen an empty event pool.  `wait_for_interrupt` must re-enable
/// interrupts and sleep as one atomic step (`sei; sleep` on AVR), so a
/// wakeup raised just before the call is not lost.
pub trait IdlePort {
    /// Stop the periodic tick interrupt.
    fn mask_tick(&mut self);
    /// Restart the periodic tick interrupt.
    fn unmask_tick(&mut self);
    /// Sleep until the next interrupt.
    fn wait_for_interrupt(&mut self, cs: CriticalSection<'_>);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Credential check
// ───────────────────────────────────────────────────────────────

/// Outcome of a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Granted,
    Denied,
    /// The check itself failed; doors treat this as a denial.
    Error,
}

/// Decides whether a credential opens a door.  Injected into the door
/// state machine at each check.
pub trait CredentialCheck {
    fn check(&mut self, door_id: u8, kind: AccessKind, key: u32) -> Verdict;
}
