//! System configuration parameters
//!
//! Compile-time capacities and timing constants, the board-side door
//! setup, and the per-door configuration persisted in non-volatile
//! memory and editable over the control protocol.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::timer::Millis;

// --- Capacities ---
/// Timer slots available to drivers and door controllers.
pub const MAX_TIMERS: usize = 24;
/// Event pool depth.
pub const MAX_PENDING_EVENTS: usize = 8;
/// Handler registry size.
pub const MAX_HANDLERS: usize = 16;
/// Doors per controller.  Bounded by the 4-bit door mask in access records.
pub const MAX_DOORS: usize = 4;
/// Longest actuator sequence, in steps.
pub const MAX_SEQ_STEPS: usize = 8;
/// Unsolicited protocol events held while the link is busy.
pub const MAX_QUEUED_EVENTS: usize = 4;

// --- Timing ---
/// Inter-bit silence that terminates a Wiegand word.
pub const WORD_TIMEOUT_MS: Millis = 10;
/// PIN entry is abandoned after this much keypad silence.
pub const IDLE_TIMEOUT_MS: Millis = 10_000;
/// Buzz length for reader and state machine errors.
pub const BUZZER_ERROR_MS: Millis = 400;
/// Strike-relay time when neither board nor NV config supplies one.
pub const DEFAULT_OPEN_TIME_MS: Millis = 4000;
/// Exit-button settle time.
pub const BUTTON_DEBOUNCE_MS: Millis = 50;
/// Largest open time accepted from NV config (`i16::MAX / 2`).
pub const MAX_OPEN_TIME_MS: Millis = (i16::MAX / 2) as Millis;

// --- Buzzer patterns (step 0 off, odd steps on) ---
pub const BUZZER_ACCEPTED: [Millis; 3] = [0, 100, 200];
pub const BUZZER_REJECTED: [Millis; 7] = [0, 200, 600, 200, 600, 200, 600];
pub const BUZZER_TIMEOUT: [Millis; 7] = [0, 100, 200, 100, 200, 100, 200];

// --- Device identity ---
pub const FIRMWARE_VERSION_MAJOR: u8 = 0;
pub const FIRMWARE_VERSION_MINOR: u8 = 2;

/// Serialized size of [`DoorConfig`].
pub const DOOR_CONFIG_SIZE: usize = 7;

// ---------------------------------------------------------------------------
// Persisted per-door configuration
// ---------------------------------------------------------------------------

/// Door configuration stored ahead of the access table.
///
/// The open-access window (`start`/`end` in minutes since midnight plus a
/// weekday mask) is stored for host tooling; the core has no wall clock
/// and does not enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DoorConfig {
    /// Strike-relay time in milliseconds.
    pub open_time_ms: u16,
    pub open_access_start: u16,
    pub open_access_end: u16,
    /// Bit 0 = Monday.
    pub open_access_days: u8,
}

impl DoorConfig {
    /// Little-endian wire/storage form.
    pub fn to_bytes(&self) -> [u8; DOOR_CONFIG_SIZE] {
        let mut out = [0u8; DOOR_CONFIG_SIZE];
        out[0..2].copy_from_slice(&self.open_time_ms.to_le_bytes());
        out[2..4].copy_from_slice(&self.open_access_start.to_le_bytes());
        out[4..6].copy_from_slice(&self.open_access_end.to_le_bytes());
        out[6] = self.open_access_days;
        out
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() != DOOR_CONFIG_SIZE {
            return Err(Error::InvalidArgument);
        }
        Ok(Self {
            open_time_ms: u16::from_le_bytes([raw[0], raw[1]]),
            open_access_start: u16::from_le_bytes([raw[2], raw[3]]),
            open_access_end: u16::from_le_bytes([raw[4], raw[5]]),
            open_access_days: raw[6],
        })
    }

    /// Stored open time if it is usable, otherwise `fallback`.
    /// Erased memory reads as `0xFFFF` and falls back.
    pub fn effective_open_time(&self, fallback: Millis) -> Millis {
        if self.open_time_ms > 0 && self.open_time_ms < MAX_OPEN_TIME_MS {
            self.open_time_ms
        } else {
            fallback
        }
    }
}

// ---------------------------------------------------------------------------
// Board-side door setup
// ---------------------------------------------------------------------------

/// Static wiring facts for one door, taken from the board table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorSetup {
    /// Bit position in access-record door masks.
    pub door_id: u8,
    /// Default strike time, overridden by a valid NV [`DoorConfig`].
    pub open_time_ms: u16,
    pub open_active_low: bool,
    pub led_active_low: bool,
    pub buzzer_active_low: bool,
    pub button_active_low: bool,
    pub button_debounce_ms: u16,
}

impl DoorSetup {
    pub fn new(door_id: u8) -> Self {
        Self {
            door_id,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.door_id as usize >= MAX_DOORS {
            return Err(Error::InvalidArgument);
        }
        if self.open_time_ms == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

impl Default for DoorSetup {
    fn default() -> Self {
        Self {
            door_id: 0,
            open_time_ms: DEFAULT_OPEN_TIME_MS,
            open_active_low: false,
            led_active_low: false,
            buzzer_active_low: false,
            // Exit buttons switch to ground against a pull-up.
            button_active_low: true,
            button_debounce_ms: BUTTON_DEBOUNCE_MS,
        }
    }
}
