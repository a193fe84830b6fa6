//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the whole controller
//! (runtime, drivers, door state machines, store and serial link) against
//! the mocks in `mock_hw`.  All tests run on the host with no real
//! hardware required.

mod door_scenarios_tests;
mod mock_hw;
mod protocol_flow_tests;
