//! Non-volatile access table and per-door configuration.

pub mod access;
pub mod record;

pub use access::AccessStore;
pub use record::{AccessKind, AccessRecord, RECORD_SIZE};
