//! Door state machine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  DoorController                                               │
//! │                                                               │
//! │   reader / button / own events ──▶ DoorInput                  │
//! │                                      │                        │
//! │                          states::step(state, input)           │
//! │                                      │ Action::Check?         │
//! │                          CredentialCheck ─▶ states::resolve   │
//! │                                      │                        │
//! │                          DoorContext::apply(action)           │
//! │                         (relay, LED, buzzer, idle timer)      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transition table in [`states`] is pure; every hardware effect goes
//! through [`context::DoorContext`].  Sequencer and idle-timer expiries
//! come back through [`DoorController::on_timer`] and are re-posted as
//! events from the door's own source, so they queue behind any reader
//! input that arrived first.  A completion the full pool turned away is
//! handed back by [`DoorController::take_missed`].

pub mod context;
pub mod states;

use embedded_hal::digital::OutputPin;
use log::{debug, info};

use crate::app::ports::{CredentialCheck, Verdict};
use crate::config::DoorSetup;
use crate::drivers::trigger::SeqStatus;
use crate::error::Result;
use crate::events::{Payload, SourceId};
use crate::runtime::Runtime;
use crate::timer::{Millis, TimerHandle};
use context::DoorContext;
use states::{Action, DoorInput, DoorState, Step};

pub struct DoorController<P> {
    ctx: DoorContext<P>,
    state: DoorState,
}

impl<P: OutputPin> DoorController<P> {
    /// Build a door in `Idle` with every output off.
    pub fn new<K: Copy + PartialEq>(
        rt: &Runtime<K>,
        setup: &DoorSetup,
        open: P,
        led: Option<P>,
        buzzer: Option<P>,
    ) -> Result<Self> {
        setup.validate()?;
        Ok(Self {
            ctx: DoorContext::new(rt, setup, open, led, buzzer)?,
            state: DoorState::Idle,
        })
    }

    pub fn state(&self) -> DoorState {
        self.state
    }

    pub fn door_id(&self) -> u8 {
        self.ctx.door_id
    }

    /// Source of the door's own completion events.
    pub fn source(&self) -> SourceId {
        self.ctx.source
    }

    pub fn open_time(&self) -> Millis {
        self.ctx.open_time
    }

    /// Takes effect at the next open.
    pub fn set_open_time(&mut self, ms: Millis) {
        self.ctx.open_time = ms;
    }

    /// Strike relay energized.
    pub fn is_open(&self) -> bool {
        self.ctx.open.is_on()
    }

    pub fn is_buzzing(&self) -> bool {
        self.ctx.buzzer.is_on()
    }

    pub fn is_led_on(&self) -> bool {
        self.ctx.led.is_on()
    }

    /// Route a timer expiry.  `false` if `timer` is not one of this door's.
    pub fn on_timer<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>, timer: TimerHandle) -> bool {
        let ctx = &mut self.ctx;
        if timer == ctx.idle_timer {
            ctx.post(rt, Payload::IdleTimeout);
        } else if timer == ctx.open.timer() {
            if ctx.open.on_timeout(rt) == SeqStatus::Finished {
                ctx.post(rt, Payload::OpenFinished);
            }
        } else if timer == ctx.buzzer.timer() {
            if ctx.buzzer.on_timeout(rt) == SeqStatus::Finished {
                ctx.post(rt, Payload::BuzzerFinished);
            }
        } else if timer == ctx.led.timer() {
            ctx.led.on_timeout(rt);
        } else {
            return false;
        }
        true
    }

    /// Next completion that could not be queued.  The owner feeds it to
    /// [`handle`](Self::handle) once the event queue has drained, so the
    /// door still leaves its busy state.
    pub fn take_missed(&mut self) -> Option<DoorInput> {
        let payload = self.ctx.take_missed()?;
        DoorInput::from_payload(&payload)
    }

    /// Feed one input through the state machine.  A credential check runs
    /// against `check`; without one every credential is denied.
    ///
    /// Returns `(from, to)` when the state changed.
    pub fn handle<K: Copy + PartialEq>(
        &mut self,
        rt: &Runtime<K>,
        input: DoorInput,
        check: Option<&mut dyn CredentialCheck>,
    ) -> Option<(DoorState, DoorState)> {
        let from = self.state;
        let mut step = states::step(from, input);

        if let Action::Check { kind, key } = step.action {
            let verdict = match check {
                Some(c) => c.check(self.ctx.door_id, kind, key),
                None => Verdict::Denied,
            };
            debug!(
                "door {}: {:?} {:#010x} -> {:?}",
                self.ctx.door_id, kind, key, verdict
            );
            step = states::resolve(verdict);
        }

        self.commit(rt, step);

        let to = self.state;
        if from.same_kind(&to) {
            return None;
        }
        info!("door {}: {} -> {}", self.ctx.door_id, from.name(), to.name());
        Some((from, to))
    }

    fn commit<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>, step: Step) {
        let leaving_pin = matches!(self.state, DoorState::ReadingPin { .. })
            && !matches!(step.next, DoorState::ReadingPin { .. });
        if leaving_pin {
            self.ctx.cancel_idle(rt);
        }
        self.ctx.apply(rt, step.action);
        self.state = step.next;
    }
}
