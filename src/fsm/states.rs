//! Door states and the transition table.
//!
//! [`step`] is total: every `(state, input)` pair yields a next state and
//! an [`Action`] for the controller to carry out.  A credential check is
//! itself an action; the controller runs it and feeds the verdict to
//! [`resolve`].
//!
//! ```text
//!            key                  Enter ──▶ check ─┬─▶ Opening ──open done──▶ Idle
//!   Idle ───────▶ ReadingPin ────────────────────  │
//!     │              │ idle timeout                └─▶ Rejected ─buzz done─▶ Idle
//!     │ card         ▼
//!     └──▶ check   Timeout ──buzz done──▶ Idle
//!   fault / stray input ──▶ Error ──buzz done──▶ Idle
//! ```

use crate::app::ports::Verdict;
use crate::drivers::wiegand::KEY_ENTER;
use crate::error::ReaderFault;
use crate::events::Payload;
use crate::store::AccessKind;

/// Per-door state.  The PIN accumulator lives inside `ReadingPin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Idle,
    ReadingPin { pin: u32 },
    Opening,
    Rejected,
    Timeout,
    Error,
}

impl DoorState {
    /// Stable code used on the wire.
    pub const fn code(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::ReadingPin { .. } => 1,
            Self::Opening => 2,
            Self::Rejected => 3,
            Self::Timeout => 4,
            Self::Error => 5,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::ReadingPin { .. } => "ReadingPin",
            Self::Opening => "Opening",
            Self::Rejected => "Rejected",
            Self::Timeout => "Timeout",
            Self::Error => "Error",
        }
    }

    /// Same state, ignoring the PIN accumulator.
    pub const fn same_kind(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

/// Inputs to the door state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorInput {
    Key(u8),
    Card(u32),
    ReaderFault(ReaderFault),
    IdleTimeout,
    OpenFinished,
    BuzzerFinished,
    /// Exit button pressed.
    ExitRequest,
}

impl DoorInput {
    /// Map an event payload onto a door input.  Payloads a door does not
    /// care about map to `None`.
    pub const fn from_payload(payload: &Payload) -> Option<Self> {
        Some(match *payload {
            Payload::Key(k) => Self::Key(k),
            Payload::Card(c) => Self::Card(c),
            Payload::ReaderFault(f) => Self::ReaderFault(f),
            Payload::IdleTimeout => Self::IdleTimeout,
            Payload::OpenFinished => Self::OpenFinished,
            Payload::BuzzerFinished => Self::BuzzerFinished,
            Payload::Input(true) => Self::ExitRequest,
            Payload::Input(false) | Payload::FrameReceived | Payload::TransmitDone => {
                return None;
            }
        })
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// (Re)start the PIN entry idle timer.
    ArmIdleTimer,
    /// Look the credential up, then [`resolve`].  The `next` state of the
    /// step is provisional.
    Check { kind: AccessKind, key: u32 },
    /// Strike relay and LED for the open time, accepted beep.
    Open,
    Reject,
    Timeout,
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub next: DoorState,
    pub action: Action,
}

const fn go(next: DoorState, action: Action) -> Step {
    Step { next, action }
}

const fn stay(state: DoorState) -> Step {
    go(state, Action::None)
}

/// First digit of a PIN: unused high nibbles are padded with `0xF`.
/// Every key but Enter is a digit, `*` (`0xA`) included.
pub const fn start_pin(digit: u8) -> u32 {
    0xFFFF_FFF0 | (digit & 0x0F) as u32
}

/// Shift in another digit, dropping the oldest beyond eight.
pub const fn push_digit(pin: u32, digit: u8) -> u32 {
    (pin << 4) | (digit & 0x0F) as u32
}

/// Pack a digit sequence the way the keypad accumulator does.  Host
/// tooling uses the same rule when provisioning PIN records.
pub fn pack_pin(digits: &[u8]) -> u32 {
    digits.iter().fold(u32::MAX, |pin, &d| push_digit(pin, d))
}

/// The transition function.
pub const fn step(state: DoorState, input: DoorInput) -> Step {
    use DoorInput as I;
    use DoorState as S;

    match (state, input) {
        // ── Idle ──────────────────────────────────────────
        (S::Idle, I::Key(KEY_ENTER)) => go(S::Error, Action::Fault),
        (S::Idle, I::Key(d)) => go(S::ReadingPin { pin: start_pin(d) }, Action::ArmIdleTimer),
        (S::Idle, I::Card(card)) => go(
            S::Idle,
            Action::Check {
                kind: AccessKind::Card,
                key: card,
            },
        ),
        (S::Idle, I::ReaderFault(_)) => go(S::Error, Action::Fault),
        (S::Idle | S::ReadingPin { .. }, I::ExitRequest) => go(S::Opening, Action::Open),
        (S::Idle, I::IdleTimeout | I::OpenFinished | I::BuzzerFinished) => stay(state),

        // ── PIN entry ─────────────────────────────────────
        (S::ReadingPin { pin }, I::Key(KEY_ENTER)) => go(
            S::Idle,
            Action::Check {
                kind: AccessKind::Pin,
                key: pin,
            },
        ),
        (S::ReadingPin { pin }, I::Key(d)) => go(
            S::ReadingPin {
                pin: push_digit(pin, d),
            },
            Action::ArmIdleTimer,
        ),
        (S::ReadingPin { .. }, I::IdleTimeout) => go(S::Timeout, Action::Timeout),
        (S::ReadingPin { .. }, I::Card(_) | I::ReaderFault(_)) => go(S::Error, Action::Fault),
        (S::ReadingPin { .. }, I::OpenFinished | I::BuzzerFinished) => stay(state),

        // ── Action in progress ────────────────────────────
        (S::Opening, I::OpenFinished) => go(S::Idle, Action::None),
        (S::Rejected | S::Timeout | S::Error, I::BuzzerFinished) => go(S::Idle, Action::None),
        (S::Opening | S::Rejected | S::Timeout | S::Error, _) => stay(state),
    }
}

/// Second half of a credential check.
pub const fn resolve(verdict: Verdict) -> Step {
    match verdict {
        Verdict::Granted => go(DoorState::Opening, Action::Open),
        Verdict::Denied | Verdict::Error => go(DoorState::Rejected, Action::Reject),
    }
}
