//! Control commands accepted from the host.
//!
//! Every command is one request message and one reply.  The request
//! payload length is fixed per command (Ping excepted) and checked before
//! the payload is decoded.
//!
//! | id | command             | request                     | OK reply                       |
//! |----|---------------------|-----------------------------|--------------------------------|
//! | 1  | GetDeviceDescriptor | —                           | [`DeviceDescriptor`] (7)       |
//! | 2  | Ping                | 0..=16 bytes                | echo                           |
//! | 10 | GetDoorConfig       | index u8                    | door config (7)                |
//! | 11 | SetDoorConfig       | index u8, door config       | —                              |
//! | 20 | GetAccessRecord     | index u16                   | record (5)                     |
//! | 21 | SetAccessRecord     | index u16, record           | —                              |
//! | 22 | SetAccess           | record                      | —                              |
//! | 23 | RemoveAllAccess     | —                           | —                              |
//! | 24 | GetAccess           | record                      | doors u8                       |
//! | 25 | GetUnusedAccess     | start u16, clear u8         | record, next u16               |
//!
//! Multi-byte fields are little-endian.

use heapless::Vec;

use crate::config::{DOOR_CONFIG_SIZE, DoorConfig};
use crate::error::{Error, Result};
use crate::rpc::codec::{MAX_PAYLOAD, Message};
use crate::store::{AccessRecord, RECORD_SIZE};

/// Unsolicited event: the controller finished booting.  No payload.
pub const EVENT_STARTED: u8 = 127;
/// Unsolicited event: a door changed state.  Payload `[door, state]`.
pub const EVENT_DOOR_STATE: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    GetDeviceDescriptor = 1,
    Ping = 2,
    GetDoorConfig = 10,
    SetDoorConfig = 11,
    GetAccessRecord = 20,
    SetAccessRecord = 21,
    SetAccess = 22,
    RemoveAllAccess = 23,
    GetAccess = 24,
    GetUnusedAccess = 25,
}

impl CommandId {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            1 => Self::GetDeviceDescriptor,
            2 => Self::Ping,
            10 => Self::GetDoorConfig,
            11 => Self::SetDoorConfig,
            20 => Self::GetAccessRecord,
            21 => Self::SetAccessRecord,
            22 => Self::SetAccess,
            23 => Self::RemoveAllAccess,
            24 => Self::GetAccess,
            25 => Self::GetUnusedAccess,
            _ => return None,
        })
    }

    /// Required request payload length; `None` for variable length.
    pub const fn payload_len(self) -> Option<usize> {
        match self {
            Self::GetDeviceDescriptor | Self::RemoveAllAccess => Some(0),
            Self::Ping => None,
            Self::GetDoorConfig => Some(1),
            Self::SetDoorConfig => Some(1 + DOOR_CONFIG_SIZE),
            Self::GetAccessRecord => Some(2),
            Self::SetAccessRecord => Some(2 + RECORD_SIZE),
            Self::SetAccess | Self::GetAccess => Some(RECORD_SIZE),
            Self::GetUnusedAccess => Some(3),
        }
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetDeviceDescriptor,
    Ping(Vec<u8, MAX_PAYLOAD>),
    GetDoorConfig { index: u8 },
    SetDoorConfig { index: u8, config: DoorConfig },
    GetAccessRecord { index: u16 },
    SetAccessRecord { index: u16, record: AccessRecord },
    /// Grant (or with an empty door mask, revoke) a credential.
    SetAccess(AccessRecord),
    RemoveAllAccess,
    GetAccess(AccessRecord),
    GetUnusedAccess { start: u16, clear: bool },
}

fn le16(raw: &[u8]) -> u16 {
    u16::from_le_bytes([raw[0], raw[1]])
}

impl Command {
    /// Decode a request.  Unknown ids are `NotFound`, a wrong payload
    /// length is `InvalidArgument`.
    pub fn parse(msg: &Message) -> Result<Self> {
        let id = CommandId::from_u8(msg.kind).ok_or(Error::NotFound)?;
        let p = msg.payload.as_slice();
        if id.payload_len().is_some_and(|len| len != p.len()) {
            return Err(Error::InvalidArgument);
        }

        Ok(match id {
            CommandId::GetDeviceDescriptor => Self::GetDeviceDescriptor,
            CommandId::Ping => Self::Ping(msg.payload.clone()),
            CommandId::GetDoorConfig => Self::GetDoorConfig { index: p[0] },
            CommandId::SetDoorConfig => Self::SetDoorConfig {
                index: p[0],
                config: DoorConfig::from_bytes(&p[1..])?,
            },
            CommandId::GetAccessRecord => Self::GetAccessRecord { index: le16(p) },
            CommandId::SetAccessRecord => Self::SetAccessRecord {
                index: le16(p),
                record: AccessRecord::from_wire(&p[2..])?,
            },
            CommandId::SetAccess => Self::SetAccess(AccessRecord::from_wire(p)?),
            CommandId::RemoveAllAccess => Self::RemoveAllAccess,
            CommandId::GetAccess => Self::GetAccess(AccessRecord::from_wire(p)?),
            CommandId::GetUnusedAccess => Self::GetUnusedAccess {
                start: le16(p),
                clear: p[2] != 0,
            },
        })
    }

    pub fn id(&self) -> CommandId {
        match self {
            Self::GetDeviceDescriptor => CommandId::GetDeviceDescriptor,
            Self::Ping(_) => CommandId::Ping,
            Self::GetDoorConfig { .. } => CommandId::GetDoorConfig,
            Self::SetDoorConfig { .. } => CommandId::SetDoorConfig,
            Self::GetAccessRecord { .. } => CommandId::GetAccessRecord,
            Self::SetAccessRecord { .. } => CommandId::SetAccessRecord,
            Self::SetAccess(_) => CommandId::SetAccess,
            Self::RemoveAllAccess => CommandId::RemoveAllAccess,
            Self::GetAccess(_) => CommandId::GetAccess,
            Self::GetUnusedAccess { .. } => CommandId::GetUnusedAccess,
        }
    }

    /// Request message, as the host side builds it.
    pub fn encode(&self) -> Result<Message> {
        let mut p: Vec<u8, MAX_PAYLOAD> = Vec::new();
        match self {
            Self::GetDeviceDescriptor | Self::RemoveAllAccess => {}
            Self::Ping(data) => put(&mut p, data)?,
            Self::GetDoorConfig { index } => put(&mut p, &[*index])?,
            Self::SetDoorConfig { index, config } => {
                put(&mut p, &[*index])?;
                put(&mut p, &config.to_bytes())?;
            }
            Self::GetAccessRecord { index } => put(&mut p, &index.to_le_bytes())?,
            Self::SetAccessRecord { index, record } => {
                put(&mut p, &index.to_le_bytes())?;
                put(&mut p, &record.pack())?;
            }
            Self::SetAccess(record) | Self::GetAccess(record) => put(&mut p, &record.pack())?,
            Self::GetUnusedAccess { start, clear } => {
                put(&mut p, &start.to_le_bytes())?;
                put(&mut p, &[u8::from(*clear)])?;
            }
        }
        Ok(Message {
            kind: self.id() as u8,
            payload: p,
        })
    }
}

fn put(p: &mut Vec<u8, MAX_PAYLOAD>, bytes: &[u8]) -> Result<()> {
    p.extend_from_slice(bytes).map_err(|_| Error::TooBig)
}

/// Reply to `GetDeviceDescriptor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub major: u8,
    pub minor: u8,
    pub doors: u8,
    pub records: u16,
    pub free_records: u16,
}

impl DeviceDescriptor {
    pub const SIZE: usize = 7;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let r = self.records.to_le_bytes();
        let f = self.free_records.to_le_bytes();
        [self.major, self.minor, self.doors, r[0], r[1], f[0], f[1]]
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let raw: &[u8; Self::SIZE] = raw.try_into().map_err(|_| Error::InvalidArgument)?;
        Ok(Self {
            major: raw[0],
            minor: raw[1],
            doors: raw[2],
            records: le16(&raw[3..5]),
            free_records: le16(&raw[5..7]),
        })
    }
}
