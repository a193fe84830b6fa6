//! Timer-debounced digital input (door exit button).
//!
//! ## Hardware
//!
//! Momentary switch, usually active-low against a pull-up.  The edge ISR
//! calls [`DebouncedInput::on_edge`] with the raw level; every edge
//! re-arms the debounce timer, so only a level that stays put for the
//! whole debounce window is reported.
//!
//! ```text
//!  raw    ‾‾‾|_|‾|___________|‾|_|‾‾‾‾‾‾
//!  timer        ├─ debounce ─┤     ├─ debounce ─┤
//!  event                     Input(true)        Input(false)
//! ```

use core::cell::RefCell;

use critical_section::Mutex;
use log::debug;

use crate::error::Result;
use crate::events::{Payload, SourceId};
use crate::runtime::Runtime;
use crate::timer::{Millis, TimerHandle};

#[derive(Debug, Clone, Copy)]
struct InputState {
    /// Last reported level, `None` before the first sample settles.
    settled: Option<bool>,
    /// Level seen by the most recent edge.
    raw: bool,
}

pub struct DebouncedInput {
    source: SourceId,
    timer: TimerHandle,
    debounce: Millis,
    active_low: bool,
    state: Mutex<RefCell<InputState>>,
}

impl DebouncedInput {
    pub fn new<K: Copy + PartialEq>(
        rt: &Runtime<K>,
        debounce: Millis,
        active_low: bool,
    ) -> Result<Self> {
        Ok(Self {
            source: rt.allocate_source()?,
            timer: rt.allocate_timer()?,
            debounce,
            active_low,
            state: Mutex::new(RefCell::new(InputState {
                settled: None,
                raw: false,
            })),
        })
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn timer(&self) -> TimerHandle {
        self.timer
    }

    /// Seed the settled level from the pin at boot without reporting it.
    pub fn init_level(&self, level: bool) {
        let active = level != self.active_low;
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            st.settled = Some(active);
            st.raw = active;
        });
    }

    /// Settled logical level, `true` = pressed.
    pub fn is_active(&self) -> Option<bool> {
        critical_section::with(|cs| self.state.borrow_ref(cs).settled)
    }

    /// Edge ISR entry with the raw pin level.
    pub fn on_edge<K: Copy + PartialEq>(&self, rt: &Runtime<K>, level: bool) {
        let active = level != self.active_low;
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).raw = active);
        rt.schedule_in(self.timer, self.debounce);
    }

    /// Debounce timer expiry.  Posts `Input(level)` if the settled level changed.
    pub fn on_timeout<K: Copy + PartialEq>(&self, rt: &Runtime<K>) {
        let changed = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            if st.settled == Some(st.raw) {
                None
            } else {
                st.settled = Some(st.raw);
                Some(st.raw)
            }
        });
        if let Some(active) = changed {
            debug!("input {}: settled {}", self.source.get(), active);
            if rt.post(self.source, Payload::Input(active)).is_err() {
                debug!("input {}: change lost, pool full", self.source.get());
            }
        }
    }
}
