//! Per-door hardware context.
//!
//! `DoorContext` owns the strike relay, LED and buzzer sequencers plus the
//! PIN idle timer, and carries out the [`Action`]s the transition table
//! asks for.  Completion of a sequence is reported back to the state
//! machine as an event from the door's own source, so it is ordered with
//! reader input in the single event queue.  When the pool is full the
//! completion is held in `missed` and replayed once the queue drains.

use embedded_hal::digital::OutputPin;
use heapless::Vec;
use log::warn;

use super::states::Action;
use crate::config::{
    BUZZER_ACCEPTED, BUZZER_ERROR_MS, BUZZER_REJECTED, BUZZER_TIMEOUT, DoorSetup, IDLE_TIMEOUT_MS,
};
use crate::drivers::trigger::{SeqStatus, Trigger};
use crate::error::Result;
use crate::events::{Payload, SourceId};
use crate::runtime::Runtime;
use crate::timer::{Millis, TimerHandle};

pub struct DoorContext<P> {
    pub door_id: u8,
    pub open_time: Millis,
    pub source: SourceId,
    pub idle_timer: TimerHandle,
    pub open: Trigger<P>,
    pub led: Trigger<P>,
    pub buzzer: Trigger<P>,
    /// Completions the event pool had no room for, oldest first.
    missed: Vec<Payload, 3>,
}

impl<P: OutputPin> DoorContext<P> {
    pub fn new<K: Copy + PartialEq>(
        rt: &Runtime<K>,
        setup: &DoorSetup,
        open: P,
        led: Option<P>,
        buzzer: Option<P>,
    ) -> Result<Self> {
        Ok(Self {
            door_id: setup.door_id,
            open_time: setup.open_time_ms,
            source: rt.allocate_source()?,
            idle_timer: rt.allocate_timer()?,
            open: Trigger::new(rt, Some(open), setup.open_active_low)?,
            led: Trigger::new(rt, led, setup.led_active_low)?,
            buzzer: Trigger::new(rt, buzzer, setup.buzzer_active_low)?,
            missed: Vec::new(),
        })
    }

    /// Carry out a transition's side effect.  `Check` is resolved by the
    /// controller before it gets here.
    pub fn apply<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>, action: Action) {
        match action {
            Action::None | Action::Check { .. } => {}
            Action::ArmIdleTimer => self.arm_idle(rt),
            Action::Open => self.open(rt),
            Action::Reject => self.buzz(rt, &BUZZER_REJECTED),
            Action::Timeout => self.buzz(rt, &BUZZER_TIMEOUT),
            Action::Fault => self.buzz(rt, &[0, BUZZER_ERROR_MS]),
        }
    }

    pub fn arm_idle<K: Copy + PartialEq>(&self, rt: &Runtime<K>) {
        rt.schedule_in(self.idle_timer, IDLE_TIMEOUT_MS);
    }

    /// Stop the idle timer and drop an expiry that is already queued.
    pub fn cancel_idle<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>) {
        rt.deschedule(self.idle_timer);
        self.forget(rt, Payload::IDLE_TIMEOUT);
    }

    fn open<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>) {
        self.open.stop(rt);
        self.forget(rt, Payload::OPEN_FINISHED);
        let status = self.open.start(rt, self.open_time);
        self.settle(rt, status, Payload::OpenFinished);

        self.led.stop(rt);
        if let Err(e) = self.led.start(rt, self.open_time) {
            warn!("door {}: LED start failed: {}", self.door_id, e);
        }

        self.buzz(rt, &BUZZER_ACCEPTED);
    }

    /// Replace whatever the buzzer is doing with `seq`.
    fn buzz<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>, seq: &[Millis]) {
        self.buzzer.stop(rt);
        self.forget(rt, Payload::BUZZER_FINISHED);
        let status = self.buzzer.start_seq(rt, seq);
        self.settle(rt, status, Payload::BuzzerFinished);
    }

    /// A sequence that could not run, or ended at once, still has to
    /// report completion or the door never leaves its busy state.
    fn settle<K: Copy + PartialEq>(
        &mut self,
        rt: &Runtime<K>,
        status: Result<SeqStatus>,
        done: Payload,
    ) {
        match status {
            Ok(SeqStatus::Running) => {}
            Ok(_) => self.post(rt, done),
            Err(e) => {
                warn!("door {}: sequence start failed: {}", self.door_id, e);
                self.post(rt, done);
            }
        }
    }

    /// Queue `payload` from the door's source, or hold it for
    /// [`take_missed`](Self::take_missed) if the pool is full.
    pub fn post<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>, payload: Payload) {
        if rt.post(self.source, payload).is_ok() {
            return;
        }
        warn!("door {}: event pool full, holding {:?}", self.door_id, payload);
        if self.missed.contains(&payload) {
            return;
        }
        if self.missed.push(payload).is_err() {
            warn!("door {}: dropped {:?}", self.door_id, payload);
        }
    }

    /// Oldest completion that could not be queued.
    pub fn take_missed(&mut self) -> Option<Payload> {
        if self.missed.is_empty() {
            return None;
        }
        Some(self.missed.remove(0))
    }

    /// Drop a stale completion, queued or held.
    fn forget<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>, id: u8) {
        rt.remove_events(self.source, id);
        self.missed.retain(|p| p.id() != id);
    }
}
