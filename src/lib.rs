//! Door-access controller firmware library.
//!
//! The runtime core of a standalone door controller: a cooperative event
//! loop with millisecond timers, a Wiegand credential decoder, one state
//! machine per door, a non-volatile access table and a framed serial
//! control protocol.  Pin/interrupt drivers and the UART byte driver live
//! in the board crate and reach the core through the traits in
//! [`app::ports`].
//!
//! Builds `no_std`; host tests link `std` for the critical-section shim.

#![cfg_attr(not(test), no_std)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod events;
pub mod fsm;
pub mod rpc;
pub mod runtime;
pub mod store;
pub mod timer;

mod error;

pub use error::{Error, ReaderFault, Result};
