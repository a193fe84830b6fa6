//! Reader, input and actuator drivers.
//!
//! Each driver owns its timers and event source and is driven from two
//! sides: the board's ISRs call the edge entry points, and the
//! application forwards timer expiries from the dispatch loop.

pub mod button;
pub mod trigger;
pub mod wiegand;
