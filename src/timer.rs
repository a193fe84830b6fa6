//! Millisecond clock arithmetic and the ordered deadline list.
//!
//! The clock is a 16-bit counter advanced once per hardware tick.  Instants
//! are compared through the signed difference, so ordering stays correct
//! across wraparound as long as the two instants are less than 32.767 s
//! apart.
//!
//! ```text
//!   slots: [ A | B | C | D ]        head ──▶ C ──▶ A ──▶ D ──▶ ∅
//!            └─ fixed table ─┘               (ascending deadline)
//! ```
//!
//! Pending timers form a singly linked list threaded through a fixed slot
//! table.  Insertion is a linear scan; the list never holds more than a
//! handful of entries.

use crate::error::{Error, Result};

/// Milliseconds on the wrapping 16-bit clock.
pub type Millis = u16;

/// `a` is strictly later than `b`.
pub const fn time_after(a: Millis, b: Millis) -> bool {
    (b.wrapping_sub(a) as i16) < 0
}

/// `a` is strictly earlier than `b`.
pub const fn time_before(a: Millis, b: Millis) -> bool {
    time_after(b, a)
}

/// `a` is later than or equal to `b`.
pub const fn time_after_eq(a: Millis, b: Millis) -> bool {
    (a.wrapping_sub(b) as i16) >= 0
}

/// `a` is earlier than or equal to `b`.
pub const fn time_before_eq(a: Millis, b: Millis) -> bool {
    time_after_eq(b, a)
}

/// Identity of an allocated timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u8);

impl TimerHandle {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    deadline: Millis,
    next: Option<u8>,
    pending: bool,
}

const IDLE_SLOT: Slot = Slot {
    deadline: 0,
    next: None,
    pending: false,
};

/// Fixed table of timer slots with a deadline-ordered pending list.
pub struct TimerList<const N: usize> {
    slots: [Slot; N],
    allocated: u8,
    head: Option<u8>,
}

impl<const N: usize> TimerList<N> {
    pub const fn new() -> Self {
        Self {
            slots: [IDLE_SLOT; N],
            allocated: 0,
            head: None,
        }
    }

    /// Claim a slot.  Slots are never returned; allocate once at boot.
    pub fn allocate(&mut self) -> Result<TimerHandle> {
        let idx = self.allocated as usize;
        if idx >= N || idx > u8::MAX as usize {
            return Err(Error::NoSpace);
        }
        self.allocated += 1;
        Ok(TimerHandle(idx as u8))
    }

    fn valid(&self, timer: TimerHandle) -> bool {
        let ok = timer.0 < self.allocated;
        debug_assert!(ok, "timer handle {} not allocated here", timer.0);
        ok
    }

    /// Arm `timer` for `when`, replacing any earlier deadline.
    pub fn schedule_at(&mut self, timer: TimerHandle, when: Millis) {
        if !self.valid(timer) {
            return;
        }
        let idx = timer.0;
        self.unlink(idx);
        self.slots[idx as usize].deadline = when;
        self.link(idx);
    }

    /// Arm `timer` for `delay` ms after `now`.
    pub fn schedule_in(&mut self, timer: TimerHandle, now: Millis, delay: Millis) {
        self.schedule_at(timer, now.wrapping_add(delay));
    }

    /// Disarm without firing.  No-op if the timer is not pending.
    pub fn deschedule(&mut self, timer: TimerHandle) {
        if self.valid(timer) {
            self.unlink(timer.0);
        }
    }

    pub fn is_pending(&self, timer: TimerHandle) -> bool {
        (timer.0 < self.allocated) && self.slots[timer.index()].pending
    }

    /// Deadline of `timer` if it is pending.
    pub fn deadline(&self, timer: TimerHandle) -> Option<Millis> {
        self.is_pending(timer)
            .then(|| self.slots[timer.index()].deadline)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.head.map(|h| self.slots[h as usize].deadline)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Detach and return the head timer if its deadline has passed.
    pub fn pop_due(&mut self, now: Millis) -> Option<TimerHandle> {
        let head = self.head?;
        let slot = &mut self.slots[head as usize];
        if !time_before_eq(slot.deadline, now) {
            return None;
        }
        self.head = slot.next.take();
        slot.pending = false;
        Some(TimerHandle(head))
    }

    /// Pending timers in firing order.
    pub fn pending(&self) -> impl Iterator<Item = TimerHandle> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let idx = cursor?;
            cursor = self.slots[idx as usize].next;
            Some(TimerHandle(idx))
        })
    }

    fn link(&mut self, idx: u8) {
        let when = self.slots[idx as usize].deadline;
        self.slots[idx as usize].pending = true;

        // New head when the list is empty or `when` precedes the current head.
        let mut cursor = match self.head {
            Some(h) if time_before_eq(self.slots[h as usize].deadline, when) => h,
            other => {
                self.slots[idx as usize].next = other;
                self.head = Some(idx);
                return;
            }
        };

        // Equal deadlines keep insertion order.
        while let Some(next) = self.slots[cursor as usize].next {
            if time_before_eq(self.slots[next as usize].deadline, when) {
                cursor = next;
            } else {
                break;
            }
        }
        self.slots[idx as usize].next = self.slots[cursor as usize].next;
        self.slots[cursor as usize].next = Some(idx);
    }

    fn unlink(&mut self, idx: u8) {
        if !self.slots[idx as usize].pending {
            return;
        }
        let next = self.slots[idx as usize].next.take();
        self.slots[idx as usize].pending = false;

        if self.head == Some(idx) {
            self.head = next;
            return;
        }
        let mut cursor = self.head;
        while let Some(c) = cursor {
            if self.slots[c as usize].next == Some(idx) {
                self.slots[c as usize].next = next;
                return;
            }
            cursor = self.slots[c as usize].next;
        }
    }
}

impl<const N: usize> Default for TimerList<N> {
    fn default() -> Self {
        Self::new()
    }
}
