//! Runtime context: clock, timers, event pool and handler registry.
//!
//! One [`Runtime`] is created at boot (usually as a `static`) and passed by
//! reference to every component.  All state sits behind
//! `critical_section::Mutex`, so the same `&Runtime` is usable from the
//! tick ISR, edge ISRs and the main loop.
//!
//! ```text
//!  tick ISR ──▶ tick()            main loop
//!  edge ISR ──▶ schedule_in()     ┌──────────────────────────────┐
//!           ──▶ post()            │ fire_due_timers ─▶ on_timer   │
//!                                 │ dispatch_next   ─▶ on_event   │
//!                                 │ on_idle         ─▶ deferred   │
//!                                 │ idle            ─▶ IdlePort   │
//!                                 └──────────────────────────────┘
//! ```
//!
//! Timer expiry and event delivery both run in the main loop, never inside
//! a critical section.  Components keep their own [`TimerHandle`]s and
//! [`SourceId`]s; the application routes them in its [`Dispatch`] impl.

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use log::debug;

use crate::app::ports::IdlePort;
use crate::config::{MAX_HANDLERS, MAX_PENDING_EVENTS, MAX_TIMERS};
use crate::error::{Error, Result};
use crate::events::{Event, EventQueue, Handler, HandlerTable, Payload, SourceId};
use crate::timer::{Millis, TimerHandle, TimerList};

/// Main-loop callbacks.  `K` is the application's handler target type.
pub trait Dispatch<K> {
    /// `timer` reached its deadline.  It is no longer pending.
    fn on_timer(&mut self, rt: &Runtime<K>, timer: TimerHandle);

    /// `event` matched a handler registered with `target`.
    fn on_event(&mut self, rt: &Runtime<K>, target: K, event: &Event);

    /// No timer is due and the event pool is empty.  Work that could not
    /// be queued earlier is retried here.  Returns `true` if any was done.
    fn on_idle(&mut self, _rt: &Runtime<K>) -> bool {
        false
    }
}

pub struct Runtime<K> {
    now: Mutex<Cell<Millis>>,
    next_source: Mutex<Cell<u8>>,
    timers: Mutex<RefCell<TimerList<MAX_TIMERS>>>,
    events: Mutex<RefCell<EventQueue<MAX_PENDING_EVENTS>>>,
    handlers: Mutex<RefCell<HandlerTable<K, MAX_HANDLERS>>>,
}

impl<K: Copy + PartialEq> Runtime<K> {
    pub const fn new() -> Self {
        Self {
            now: Mutex::new(Cell::new(0)),
            next_source: Mutex::new(Cell::new(1)),
            timers: Mutex::new(RefCell::new(TimerList::new())),
            events: Mutex::new(RefCell::new(EventQueue::new())),
            handlers: Mutex::new(RefCell::new(HandlerTable::new())),
        }
    }

    // ── Clock ─────────────────────────────────────────────────

    /// Advance the clock by one millisecond.  Call from the tick ISR only.
    pub fn tick(&self) {
        critical_section::with(|cs| {
            let now = self.now.borrow(cs);
            now.set(now.get().wrapping_add(1));
        });
    }

    pub fn now(&self) -> Millis {
        critical_section::with(|cs| self.now.borrow(cs).get())
    }

    // ── Identities ────────────────────────────────────────────

    /// Hand out a fresh event source id.
    pub fn allocate_source(&self) -> Result<SourceId> {
        critical_section::with(|cs| {
            let next = self.next_source.borrow(cs);
            let id = SourceId::new(next.get()).ok_or(Error::NoSpace)?;
            next.set(next.get().wrapping_add(1));
            Ok(id)
        })
    }

    pub fn allocate_timer(&self) -> Result<TimerHandle> {
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).allocate())
    }

    // ── Timers ────────────────────────────────────────────────

    pub fn schedule_at(&self, timer: TimerHandle, when: Millis) {
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).schedule_at(timer, when));
    }

    /// Arm `timer` for `delay` ms from now.
    pub fn schedule_in(&self, timer: TimerHandle, delay: Millis) {
        critical_section::with(|cs| {
            let now = self.now.borrow(cs).get();
            self.timers.borrow_ref_mut(cs).schedule_in(timer, now, delay);
        });
    }

    pub fn deschedule(&self, timer: TimerHandle) {
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).deschedule(timer));
    }

    pub fn is_pending(&self, timer: TimerHandle) -> bool {
        critical_section::with(|cs| self.timers.borrow_ref(cs).is_pending(timer))
    }

    /// Remaining time until `timer` fires.
    pub fn remaining(&self, timer: TimerHandle) -> Option<Millis> {
        critical_section::with(|cs| {
            let now = self.now.borrow(cs).get();
            self.timers
                .borrow_ref(cs)
                .deadline(timer)
                .map(|d| d.wrapping_sub(now))
        })
    }

    pub fn has_pending_timers(&self) -> bool {
        critical_section::with(|cs| !self.timers.borrow_ref(cs).is_empty())
    }

    // ── Events ────────────────────────────────────────────────

    /// Queue an event.  Safe from ISR context.  A full pool drops it.
    pub fn post(&self, source: SourceId, payload: Payload) -> Result<()> {
        let res = critical_section::with(|cs| {
            self.events
                .borrow_ref_mut(cs)
                .push(Event::new(source, payload))
        });
        if res.is_err() {
            debug!("event pool full, dropped {:?} from {}", payload, source.get());
        }
        res
    }

    /// Purge queued events from `source` with id `id`.
    pub fn remove_events(&self, source: SourceId, id: u8) -> usize {
        critical_section::with(|cs| self.events.borrow_ref_mut(cs).remove(source, id))
    }

    pub fn pending_events(&self) -> usize {
        critical_section::with(|cs| self.events.borrow_ref(cs).len())
    }

    // ── Handlers ──────────────────────────────────────────────

    pub fn add_handler(&self, handler: Handler<K>) -> Result<()> {
        critical_section::with(|cs| self.handlers.borrow_ref_mut(cs).add(handler))
    }

    pub fn remove_handler(&self, source: SourceId, target: K) -> Result<()> {
        critical_section::with(|cs| self.handlers.borrow_ref_mut(cs).remove(source, target))
    }

    // ── Dispatch loop ─────────────────────────────────────────

    /// Fire every timer whose deadline has passed, earliest first.
    pub fn fire_due_timers(&self, app: &mut impl Dispatch<K>) -> usize {
        let mut fired = 0;
        loop {
            let due = critical_section::with(|cs| {
                let now = self.now.borrow(cs).get();
                self.timers.borrow_ref_mut(cs).pop_due(now)
            });
            let Some(timer) = due else {
                break;
            };
            app.on_timer(self, timer);
            fired += 1;
        }
        fired
    }

    /// Deliver the oldest event to its handlers.  `false` if none was queued.
    pub fn dispatch_next(&self, app: &mut impl Dispatch<K>) -> bool {
        let next = critical_section::with(|cs| {
            let event = self.events.borrow_ref_mut(cs).pop()?;
            let targets = self.handlers.borrow_ref(cs).matching(&event);
            Some((event, targets))
        });
        let Some((event, targets)) = next else {
            return false;
        };
        if targets.is_empty() {
            debug!("unhandled event {:?} from {}", event.payload, event.source.get());
        }
        for target in targets {
            app.on_event(self, target, &event);
        }
        true
    }

    /// One loop iteration.  `true` if any timer fired or event was handled.
    pub fn poll(&self, app: &mut impl Dispatch<K>) -> bool {
        let fired = self.fire_due_timers(app);
        let dispatched = self.dispatch_next(app);
        fired > 0 || dispatched
    }

    /// Poll until no timer is due, no event is queued and the app has no
    /// deferred work left.
    pub fn run_until_idle(&self, app: &mut impl Dispatch<K>) {
        loop {
            while self.poll(app) {}
            if !app.on_idle(self) {
                break;
            }
        }
    }

    /// Sleep until the next interrupt.  The tick is masked only while the
    /// pending timer list is empty.
    ///
    /// The pool check and the sleep share one critical section, so an
    /// event posted after the check keeps the CPU awake.
    pub fn idle(&self, port: &mut impl IdlePort) {
        critical_section::with(|cs| {
            if !self.events.borrow_ref(cs).is_empty() {
                return;
            }
            let no_timers = self.timers.borrow_ref(cs).is_empty();
            if no_timers {
                port.mask_tick();
            }
            port.wait_for_interrupt(cs);
            if no_timers {
                port.unmask_tick();
            }
        });
    }

    /// Run forever.
    pub fn run(&self, app: &mut impl Dispatch<K>, port: &mut impl IdlePort) -> ! {
        loop {
            self.run_until_idle(app);
            self.idle(port);
        }
    }
}

impl<K: Copy + PartialEq> Default for Runtime<K> {
    fn default() -> Self {
        Self::new()
    }
}
