//! Access table over byte-addressable non-volatile memory.
//!
//! ```text
//!  0                  doors·7                                   size
//!  ├─ DoorConfig × doors ─┼─ AccessRecord × capacity ─┼─ unused ─┤
//! ```
//!
//! Capacity is whatever fits after the door configuration block.  At most
//! one valid record exists per `(kind, key)`; every mutating operation
//! preserves that.

use log::{debug, info, warn};

use crate::app::ports::{CredentialCheck, NvMemory, Verdict};
use crate::config::{DOOR_CONFIG_SIZE, DoorConfig};
use crate::error::{Error, Result};

use super::record::{AccessKind, AccessRecord, RECORD_SIZE};

pub struct AccessStore<M> {
    mem: M,
    doors: usize,
    capacity: usize,
}

impl<M: NvMemory> AccessStore<M> {
    pub fn new(mem: M, doors: usize) -> Result<Self> {
        let config_bytes = doors * DOOR_CONFIG_SIZE;
        let capacity = mem
            .capacity()
            .checked_sub(config_bytes)
            .map(|rest| rest / RECORD_SIZE)
            .ok_or(Error::NoSpace)?;
        // Record indices travel as u16 on the wire.
        let capacity = capacity.min(u16::MAX as usize);
        Ok(Self {
            mem,
            doors,
            capacity,
        })
    }

    /// Number of record slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn door_count(&self) -> usize {
        self.doors
    }

    pub fn memory(&self) -> &M {
        &self.mem
    }

    pub fn into_inner(self) -> M {
        self.mem
    }

    fn record_addr(&self, index: usize) -> usize {
        self.doors * DOOR_CONFIG_SIZE + index * RECORD_SIZE
    }

    fn read_slot(&self, index: usize) -> Result<AccessRecord> {
        let mut raw = [0u8; RECORD_SIZE];
        self.mem.read(self.record_addr(index), &mut raw)?;
        Ok(AccessRecord::unpack(raw))
    }

    fn write_slot(&mut self, index: usize, rec: &AccessRecord) -> Result<()> {
        let addr = self.record_addr(index);
        let raw = if rec.is_free() {
            AccessRecord::NONE.pack()
        } else {
            rec.pack()
        };
        self.mem.write(addr, &raw)
    }

    // ── Raw slot access ───────────────────────────────────────

    /// Record at `index`; free slots read as [`AccessRecord::NONE`].
    pub fn get(&self, index: usize) -> Result<AccessRecord> {
        if index >= self.capacity {
            return Err(Error::InvalidArgument);
        }
        self.read_slot(index)
    }

    /// Overwrite slot `index`.  Refuses a credential that already lives in
    /// another slot.
    pub fn set(&mut self, index: usize, rec: &AccessRecord) -> Result<()> {
        if index >= self.capacity {
            return Err(Error::InvalidArgument);
        }
        if !rec.is_free() {
            if let Some((other, _)) = self.find(rec.kind, rec.key)? {
                if other != index {
                    return Err(Error::AlreadyExists);
                }
            }
        }
        self.write_slot(index, rec)
    }

    // ── Credential operations ─────────────────────────────────

    /// First slot holding `(kind, key)`.  `kind = None` finds the first
    /// free slot instead.
    pub fn find(&self, kind: AccessKind, key: u32) -> Result<Option<(usize, AccessRecord)>> {
        for index in 0..self.capacity {
            let rec = self.read_slot(index)?;
            let hit = if kind == AccessKind::None {
                rec.is_free()
            } else {
                rec.matches(kind, key)
            };
            if hit {
                return Ok(Some((index, rec)));
            }
        }
        Ok(None)
    }

    /// Grant `(kind, key)` the doors in `doors`.  An empty mask removes
    /// the credential.
    pub fn set_access(&mut self, kind: AccessKind, key: u32, doors: u8) -> Result<()> {
        if kind == AccessKind::None {
            return Err(Error::InvalidArgument);
        }
        let doors = doors & 0x0F;
        match self.find(kind, key)? {
            Some((index, _)) if doors == 0 => {
                info!("access: removed {:?} {:#010x} from slot {}", kind, key, index);
                self.write_slot(index, &AccessRecord::NONE)
            }
            Some((index, mut rec)) => {
                if rec.doors == doors {
                    return Ok(());
                }
                rec.doors = doors;
                info!("access: {:?} {:#010x} now doors {:#06b}", kind, key, doors);
                self.write_slot(index, &rec)
            }
            None if doors == 0 => Ok(()),
            None => {
                let (index, _) = self
                    .find(AccessKind::None, 0)?
                    .ok_or(Error::NoSpace)?;
                info!(
                    "access: added {:?} {:#010x} doors {:#06b} at slot {}",
                    kind, key, doors, index
                );
                self.write_slot(index, &AccessRecord::new(kind, key, doors))
            }
        }
    }

    /// Door mask of `(kind, key)`.
    pub fn get_access(&self, kind: AccessKind, key: u32) -> Result<u8> {
        if kind == AccessKind::None {
            return Err(Error::InvalidArgument);
        }
        self.find(kind, key)?
            .map(|(_, rec)| rec.doors)
            .ok_or(Error::NotFound)
    }

    /// Whether `(kind, key)` opens `door_id`.  A granting record is marked
    /// used the first time.
    pub fn has_access(&mut self, kind: AccessKind, key: u32, door_id: u8) -> Result<bool> {
        if kind == AccessKind::None {
            return Err(Error::InvalidArgument);
        }
        let (index, mut rec) = self.find(kind, key)?.ok_or(Error::NotFound)?;
        if !rec.grants(door_id) {
            return Ok(false);
        }
        if !rec.used {
            rec.used = true;
            self.write_slot(index, &rec)?;
        }
        Ok(true)
    }

    /// Free every slot.  Returns how many credentials were removed.
    pub fn remove_all_access(&mut self) -> Result<usize> {
        let mut removed = 0;
        for index in 0..self.capacity {
            if !self.read_slot(index)?.is_free() {
                self.write_slot(index, &AccessRecord::NONE)?;
                removed += 1;
            }
        }
        info!("access: removed all ({} records)", removed);
        Ok(removed)
    }

    pub fn free_slots(&self) -> Result<usize> {
        let mut free = 0;
        for index in 0..self.capacity {
            if self.read_slot(index)?.is_free() {
                free += 1;
            }
        }
        Ok(free)
    }

    /// Next credential at or after `start` that has not opened a door since
    /// the last clear, plus the index to resume from.  With `clear`, used
    /// records passed over are reset to unused.  Past the end the result is
    /// `(NONE, capacity)`.
    pub fn next_unused(&mut self, start: usize, clear: bool) -> Result<(AccessRecord, usize)> {
        for index in start..self.capacity {
            let mut rec = self.read_slot(index)?;
            if rec.is_free() {
                continue;
            }
            if !rec.used {
                return Ok((rec, index + 1));
            }
            if clear {
                rec.used = false;
                self.write_slot(index, &rec)?;
            }
        }
        Ok((AccessRecord::NONE, self.capacity))
    }

    // ── Door configuration ────────────────────────────────────

    pub fn door_config(&self, door: usize) -> Result<DoorConfig> {
        if door >= self.doors {
            return Err(Error::InvalidArgument);
        }
        let mut raw = [0u8; DOOR_CONFIG_SIZE];
        self.mem.read(door * DOOR_CONFIG_SIZE, &mut raw)?;
        DoorConfig::from_bytes(&raw)
    }

    pub fn set_door_config(&mut self, door: usize, config: &DoorConfig) -> Result<()> {
        if door >= self.doors {
            return Err(Error::InvalidArgument);
        }
        info!("door {}: config updated, open time {} ms", door, config.open_time_ms);
        self.mem.write(door * DOOR_CONFIG_SIZE, &config.to_bytes())
    }
}

impl<M: NvMemory> CredentialCheck for AccessStore<M> {
    fn check(&mut self, door_id: u8, kind: AccessKind, key: u32) -> Verdict {
        match self.has_access(kind, key, door_id) {
            Ok(true) => Verdict::Granted,
            Ok(false) | Err(Error::NotFound) => {
                debug!("access: {:?} {:#010x} denied on door {}", kind, key, door_id);
                Verdict::Denied
            }
            Err(e) => {
                warn!("access: check failed: {}", e);
                Verdict::Error
            }
        }
    }
}
