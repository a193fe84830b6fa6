//! Application core: domain wiring, no direct hardware access.
//!
//! The [`service::Controller`] ties doors, readers, the access store and
//! the control link together.  All interaction with the board happens
//! through the **port traits** in [`ports`] and `embedded_hal` pins,
//! keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
