//! Controller service: the composition root.
//!
//! [`Controller`] owns the door state machines, the access store, the
//! command engine and the serial port, and routes every timer expiry and
//! event the [`Runtime`] hands it.  All I/O flows through port traits and
//! `OutputPin`s, so the whole service runs on the host against mocks.
//!
//! ```text
//!  WiegandReader ──┐                       ┌──▶ DoorController ──▶ OutputPin
//!  DebouncedInput ─┼─▶ Runtime ──▶ ┌──────┴─────┐                (relay, LED, buzzer)
//!  SerialTransport ┘   (events,    │ Controller │──▶ EventSink
//!                       timers)    └──────┬─────┘
//!                                         └──▶ CommandEngine ──▶ AccessStore ──▶ NvMemory
//! ```

use embedded_hal::digital::OutputPin;
use heapless::Vec;
use log::{info, warn};

use crate::config::MAX_DOORS;
use crate::drivers::button::DebouncedInput;
use crate::drivers::wiegand::WiegandReader;
use crate::error::{Error, Result};
use crate::events::{Event, Handler, IdFilter, Payload};
use crate::fsm::DoorController;
use crate::fsm::states::DoorInput;
use crate::rpc::codec::Message;
use crate::rpc::engine::CommandEngine;
use crate::rpc::transport::SerialTransport;
use crate::runtime::{Dispatch, Runtime};
use crate::store::AccessStore;
use crate::timer::{Millis, TimerHandle};

use super::commands::{Command, EVENT_DOOR_STATE, EVENT_STARTED};
use super::events::AppEvent;
use super::ports::{EventSink, NvMemory, SerialPort};

/// Handler targets of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Index into the controller's door table.
    Door(u8),
    Control,
}

struct DoorSlot<'a, P> {
    door: DoorController<P>,
    reader: &'a WiegandReader,
    button: Option<&'a DebouncedInput>,
    /// Open time from the board table, used when NV holds none.
    board_open_time: Millis,
}

pub struct Controller<'a, P, M, S, E> {
    doors: Vec<DoorSlot<'a, P>, MAX_DOORS>,
    store: AccessStore<M>,
    transport: &'a SerialTransport,
    serial: S,
    sink: E,
    engine: CommandEngine,
}

impl<'a, P, M, S, E> Controller<'a, P, M, S, E>
where
    P: OutputPin,
    M: NvMemory,
    S: SerialPort,
    E: EventSink,
{
    /// Wire the control link.  Doors are added with [`add_door`](Self::add_door).
    pub fn new(
        rt: &Runtime<Target>,
        store: AccessStore<M>,
        transport: &'a SerialTransport,
        serial: S,
        sink: E,
    ) -> Result<Self> {
        rt.add_handler(Handler::new(transport.source(), Target::Control))?;
        Ok(Self {
            doors: Vec::new(),
            store,
            transport,
            serial,
            sink,
            engine: CommandEngine::new(),
        })
    }

    /// Attach a door with its reader and optional exit button.  A valid
    /// open time in NV overrides the board default.  Returns the door's
    /// slot index.
    pub fn add_door(
        &mut self,
        rt: &Runtime<Target>,
        mut door: DoorController<P>,
        reader: &'a WiegandReader,
        button: Option<&'a DebouncedInput>,
    ) -> Result<u8> {
        if self.doors.is_full() {
            return Err(Error::NoSpace);
        }
        let index = self.doors.len() as u8;
        let target = Target::Door(index);

        let board_open_time = door.open_time();
        match self.store.door_config(usize::from(door.door_id())) {
            Ok(cfg) => door.set_open_time(cfg.effective_open_time(board_open_time)),
            Err(e) => warn!("door {}: no stored config: {}", door.door_id(), e),
        }

        rt.add_handler(Handler::new(reader.source(), target))?;
        rt.add_handler(Handler::new(door.source(), target))?;
        if let Some(button) = button {
            rt.add_handler(
                Handler::new(button.source(), target).with_filter(IdFilter::exact(Payload::INPUT)),
            )?;
        }

        info!(
            "door {}: attached as slot {}, open time {} ms",
            door.door_id(),
            index,
            door.open_time()
        );
        self.doors
            .push(DoorSlot {
                door,
                reader,
                button,
                board_open_time,
            })
            .map_err(|_| Error::NoSpace)?;
        Ok(index)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Announce the controller on the link.
    pub fn start(&mut self) {
        self.sink.emit(&AppEvent::Started {
            doors: self.doors.len() as u8,
            records: self.store.capacity() as u16,
        });
        match Message::event(EVENT_STARTED, &[]) {
            Ok(msg) => self.send_event(msg),
            Err(e) => warn!("serial: started event: {}", e),
        }
        info!("controller started, {} doors", self.doors.len());
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn door(&self, index: u8) -> Option<&DoorController<P>> {
        self.doors.get(usize::from(index)).map(|s| &s.door)
    }

    pub fn store(&self) -> &AccessStore<M> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AccessStore<M> {
        &mut self.store
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub fn engine(&self) -> &CommandEngine {
        &self.engine
    }

    // ── Internal ──────────────────────────────────────────────

    fn send_event(&mut self, msg: Message) {
        if let Err(e) = self.transport.send_event(&mut self.serial, msg) {
            warn!("serial: event dropped: {}", e);
        }
    }

    fn on_door_event(&mut self, rt: &Runtime<Target>, index: u8, payload: &Payload) {
        if let Some(input) = DoorInput::from_payload(payload) {
            self.feed_door(rt, index, input);
        }
    }

    fn feed_door(&mut self, rt: &Runtime<Target>, index: u8, input: DoorInput) {
        let Some(slot) = self.doors.get_mut(usize::from(index)) else {
            return;
        };
        let door_id = slot.door.door_id();
        if let DoorInput::ReaderFault(fault) = input {
            warn!("door {}: {}", door_id, fault);
            self.sink.emit(&AppEvent::ReaderFault {
                door: door_id,
                fault,
            });
        }

        let Some((from, to)) = slot.door.handle(rt, input, Some(&mut self.store)) else {
            return;
        };
        self.sink.emit(&AppEvent::DoorStateChanged {
            door: door_id,
            from,
            to,
        });
        match Message::event(EVENT_DOOR_STATE, &[door_id, to.code()]) {
            Ok(msg) => self.send_event(msg),
            Err(e) => warn!("serial: door event: {}", e),
        }
    }

    /// Send the oldest queued event if the link is free.
    fn flush_outbox(&mut self) -> bool {
        match self.transport.flush(&mut self.serial) {
            Ok(sent) => sent,
            Err(e) => {
                warn!("serial: flush failed: {}", e);
                false
            }
        }
    }

    fn service_request(&mut self) {
        let Some(request) = self.transport.take_request() else {
            return;
        };
        let reply = match request {
            Ok(msg) => {
                let outcome = self.engine.handle(&msg, &mut self.store);
                if let Some(error) = outcome.reply.error_code() {
                    self.sink.emit(&AppEvent::CommandFailed {
                        kind: Some(msg.kind),
                        error,
                    });
                }
                if let Some(Command::SetDoorConfig { index, config }) = outcome.command {
                    self.apply_door_config(index, config.effective_open_time(0));
                }
                outcome.reply
            }
            Err(error) => {
                warn!("serial: bad frame: {}", error);
                self.sink.emit(&AppEvent::CommandFailed { kind: None, error });
                Message::error(error)
            }
        };
        if let Err(e) = self.transport.reply(&mut self.serial, &reply) {
            warn!("serial: reply failed: {}", e);
        }
    }

    /// Push a stored open time to the live door.  `0` restores the board
    /// default.
    fn apply_door_config(&mut self, door_id: u8, open_time: Millis) {
        let Some(slot) = self.doors.iter_mut().find(|s| s.door.door_id() == door_id) else {
            return;
        };
        let open_time = if open_time == 0 {
            slot.board_open_time
        } else {
            open_time
        };
        slot.door.set_open_time(open_time);
        self.sink.emit(&AppEvent::OpenTimeChanged {
            door: door_id,
            open_time,
        });
    }
}

impl<P, M, S, E> Dispatch<Target> for Controller<'_, P, M, S, E>
where
    P: OutputPin,
    M: NvMemory,
    S: SerialPort,
    E: EventSink,
{
    fn on_timer(&mut self, rt: &Runtime<Target>, timer: TimerHandle) {
        for slot in self.doors.iter_mut() {
            if slot.door.on_timer(rt, timer) {
                return;
            }
            if timer == slot.reader.timer() {
                slot.reader.on_timeout(rt);
                return;
            }
            if let Some(button) = slot.button {
                if timer == button.timer() {
                    button.on_timeout(rt);
                    return;
                }
            }
        }
        warn!("timer {} has no owner", timer.index());
    }

    fn on_event(&mut self, rt: &Runtime<Target>, target: Target, event: &Event) {
        match (target, event.payload) {
            (Target::Door(index), payload) => self.on_door_event(rt, index, &payload),
            (Target::Control, Payload::FrameReceived) => self.service_request(),
            (Target::Control, Payload::TransmitDone) => {
                self.flush_outbox();
            }
            (Target::Control, other) => warn!("control: unexpected {:?}", other),
        }
    }

    /// Replay door completions the pool turned away, then retry the
    /// outbox in case its `TransmitDone` or a submit was lost.
    fn on_idle(&mut self, rt: &Runtime<Target>) -> bool {
        let mut busy = false;
        for index in 0..self.doors.len() {
            while let Some(input) = self.doors[index].door.take_missed() {
                self.feed_door(rt, index as u8, input);
                busy = true;
            }
        }
        busy | self.flush_outbox()
    }
}
