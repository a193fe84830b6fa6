//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements | Connects to                      |
//! |------------|------------|----------------------------------|
//! | `eeprom`   | NvMemory   | RAM image of the AVR EEPROM      |
//! | `log_sink` | EventSink  | `log` facade (serial console)    |
//!
//! Board-specific adapters (EEPROM driver, UART, sleep) live with the
//! board bring-up and implement the same traits.

pub mod eeprom;
pub mod log_sink;
