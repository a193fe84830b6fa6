//! Command engine: runs decoded requests against the access store.
//!
//! The engine does not own a transport.  The controller hands it each
//! received message and sends back the [`Outcome::reply`] it produces.
//! Every request gets exactly one reply: OK with the command's output, or
//! an error reply carrying [`Error::code`].

use heapless::Vec;
use log::{debug, info, warn};

use crate::app::commands::{Command, DeviceDescriptor};
use crate::app::ports::NvMemory;
use crate::config::{FIRMWARE_VERSION_MAJOR, FIRMWARE_VERSION_MINOR};
use crate::error::{Error, Result};
use crate::store::AccessStore;

use super::codec::{MAX_PAYLOAD, Message};

/// Result of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub reply: Message,
    /// The command, when it parsed and ran to completion.
    pub command: Option<Command>,
}

#[derive(Debug, Default)]
pub struct CommandEngine {
    handled: u32,
    failed: u32,
}

impl CommandEngine {
    pub const fn new() -> Self {
        Self {
            handled: 0,
            failed: 0,
        }
    }

    /// Requests answered with OK.
    pub fn handled(&self) -> u32 {
        self.handled
    }

    /// Requests answered with an error.
    pub fn failed(&self) -> u32 {
        self.failed
    }

    pub fn handle<M: NvMemory>(&mut self, msg: &Message, store: &mut AccessStore<M>) -> Outcome {
        let result = Command::parse(msg).and_then(|cmd| {
            let reply = Self::execute(&cmd, store)?;
            Ok((reply, cmd))
        });
        match result {
            Ok((reply, cmd)) => {
                self.handled = self.handled.wrapping_add(1);
                debug!("rpc: {:?} ok", cmd.id());
                Outcome {
                    reply,
                    command: Some(cmd),
                }
            }
            Err(e) => {
                self.failed = self.failed.wrapping_add(1);
                warn!("rpc: request {} failed: {}", msg.kind, e);
                Outcome {
                    reply: Message::error(e),
                    command: None,
                }
            }
        }
    }

    fn execute<M: NvMemory>(cmd: &Command, store: &mut AccessStore<M>) -> Result<Message> {
        match cmd {
            Command::GetDeviceDescriptor => {
                let desc = DeviceDescriptor {
                    major: FIRMWARE_VERSION_MAJOR,
                    minor: FIRMWARE_VERSION_MINOR,
                    doors: store.door_count() as u8,
                    records: store.capacity() as u16,
                    free_records: store.free_slots()? as u16,
                };
                Message::ok(&desc.to_bytes())
            }
            Command::Ping(data) => Message::ok(data),
            Command::GetDoorConfig { index } => {
                Message::ok(&store.door_config(usize::from(*index))?.to_bytes())
            }
            Command::SetDoorConfig { index, config } => {
                store.set_door_config(usize::from(*index), config)?;
                Message::ok(&[])
            }
            Command::GetAccessRecord { index } => {
                Message::ok(&store.get(usize::from(*index))?.pack())
            }
            Command::SetAccessRecord { index, record } => {
                store.set(usize::from(*index), record)?;
                info!("rpc: slot {} set", index);
                Message::ok(&[])
            }
            Command::SetAccess(record) => {
                store.set_access(record.kind, record.key, record.doors)?;
                Message::ok(&[])
            }
            Command::RemoveAllAccess => {
                store.remove_all_access()?;
                Message::ok(&[])
            }
            Command::GetAccess(record) => Message::ok(&[store.get_access(record.kind, record.key)?]),
            Command::GetUnusedAccess { start, clear } => {
                let (record, next) = store.next_unused(usize::from(*start), *clear)?;
                let mut out: Vec<u8, MAX_PAYLOAD> = Vec::new();
                out.extend_from_slice(&record.pack())
                    .and_then(|()| out.extend_from_slice(&(next as u16).to_le_bytes()))
                    .map_err(|()| Error::TooBig)?;
                Message::ok(&out)
            }
        }
    }
}
