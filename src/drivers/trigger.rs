//! Timed on/off sequencer for the strike relay, status LED and buzzer.
//!
//! A sequence is a list of step durations in milliseconds.  Step 0 is an
//! initial off period; odd steps drive the output on and even steps drive
//! it off.  Zero-length steps are skipped, so `[0, 100, 200]` is "on for
//! 100 ms, off for 200 ms" with no leading delay.
//!
//! ```text
//!   [0, 200, 600, 200]   ─┐200┌──600──┐200┌─
//!                         └───┘       └───┘
//! ```
//!
//! The owner forwards expiry of [`Trigger::timer`] to
//! [`Trigger::on_timeout`] and learns about completion from the returned
//! [`SeqStatus`].

use embedded_hal::digital::OutputPin;
use heapless::Vec;
use log::warn;

use crate::config::MAX_SEQ_STEPS;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::timer::{Millis, TimerHandle};

/// Progress report from [`Trigger::start_seq`] and [`Trigger::on_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqStatus {
    /// A step is in progress.
    Running,
    /// The last step elapsed; the output is off.
    Finished,
    /// Nothing was running (stale expiry after `stop`).
    Idle,
}

pub struct Trigger<P> {
    pin: Option<P>,
    active_low: bool,
    timer: TimerHandle,
    steps: Vec<Millis, MAX_SEQ_STEPS>,
    pos: usize,
    running: bool,
    on: bool,
}

impl<P: OutputPin> Trigger<P> {
    /// `pin = None` builds a trigger for an output the board does not have;
    /// it still times sequences and reports completion.
    pub fn new<K: Copy + PartialEq>(
        rt: &Runtime<K>,
        pin: Option<P>,
        active_low: bool,
    ) -> Result<Self> {
        let mut trigger = Self {
            pin,
            active_low,
            timer: rt.allocate_timer()?,
            steps: Vec::new(),
            pos: 0,
            running: false,
            on: false,
        };
        trigger.drive(false);
        Ok(trigger)
    }

    pub fn timer(&self) -> TimerHandle {
        self.timer
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Logical output level (independent of polarity).
    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Start `seq`.  Fails with `Busy` while another sequence runs.
    pub fn start_seq<K: Copy + PartialEq>(
        &mut self,
        rt: &Runtime<K>,
        seq: &[Millis],
    ) -> Result<SeqStatus> {
        if self.running {
            return Err(Error::Busy);
        }
        if seq.is_empty() {
            return Err(Error::InvalidArgument);
        }
        self.steps = Vec::from_slice(seq).map_err(|_| Error::TooBig)?;
        self.pos = 0;
        self.running = true;
        Ok(self.advance(rt))
    }

    /// Switch on for `duration` ms.
    pub fn start<K: Copy + PartialEq>(
        &mut self,
        rt: &Runtime<K>,
        duration: Millis,
    ) -> Result<SeqStatus> {
        self.start_seq(rt, &[0, duration])
    }

    /// Force the output off and abandon the sequence without reporting
    /// completion.
    pub fn stop<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>) {
        rt.deschedule(self.timer);
        self.drive(false);
        self.running = false;
        self.steps.clear();
        self.pos = 0;
    }

    /// Step timer expiry.
    pub fn on_timeout<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>) -> SeqStatus {
        if !self.running {
            return SeqStatus::Idle;
        }
        self.advance(rt)
    }

    fn advance<K: Copy + PartialEq>(&mut self, rt: &Runtime<K>) -> SeqStatus {
        while self.pos < self.steps.len() && self.steps[self.pos] == 0 {
            self.pos += 1;
        }
        if self.pos >= self.steps.len() {
            self.stop(rt);
            return SeqStatus::Finished;
        }
        self.drive(self.pos % 2 == 1);
        rt.schedule_in(self.timer, self.steps[self.pos]);
        self.pos += 1;
        SeqStatus::Running
    }

    fn drive(&mut self, on: bool) {
        self.on = on;
        let Some(pin) = self.pin.as_mut() else {
            return;
        };
        let res = if on == self.active_low {
            pin.set_low()
        } else {
            pin.set_high()
        };
        if let Err(e) = res {
            warn!("trigger: output write failed: {:?}", e);
        }
    }
}
