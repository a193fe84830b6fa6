//! RAM-backed EEPROM adapter.
//!
//! Implements [`NvMemory`] over a fixed byte array that starts erased
//! (`0xFF`), matching a blank AVR EEPROM.  Used by the host simulator and
//! the test suite; boards wire their own EEPROM driver to the same trait.
//!
//! Writes that do not change a byte are skipped and not counted, the way
//! the AVR update instructions avoid wearing unchanged cells.

use crate::app::ports::NvMemory;
use crate::error::{Error, Result};

/// EEPROM size of the ATmega168 on the reference board.
pub const ATMEGA168_EEPROM_SIZE: usize = 512;

pub struct MemoryEeprom<const N: usize> {
    cells: [u8; N],
    writes: usize,
}

impl<const N: usize> MemoryEeprom<N> {
    pub const fn new() -> Self {
        Self {
            cells: [0xFF; N],
            writes: 0,
        }
    }

    /// Start from an existing image.
    pub const fn from_image(cells: [u8; N]) -> Self {
        Self { cells, writes: 0 }
    }

    pub fn image(&self) -> &[u8; N] {
        &self.cells
    }

    /// Bytes actually changed since construction.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn range(addr: usize, len: usize) -> Result<core::ops::Range<usize>> {
        let end = addr.checked_add(len).ok_or(Error::InvalidArgument)?;
        if end > N {
            return Err(Error::InvalidArgument);
        }
        Ok(addr..end)
    }
}

impl<const N: usize> Default for MemoryEeprom<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NvMemory for MemoryEeprom<N> {
    fn capacity(&self) -> usize {
        N
    }

    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<()> {
        let range = Self::range(addr, buf.len())?;
        buf.copy_from_slice(&self.cells[range]);
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        let range = Self::range(addr, data.len())?;
        for (cell, &byte) in self.cells[range].iter_mut().zip(data) {
            if *cell != byte {
                *cell = byte;
                self.writes += 1;
            }
        }
        Ok(())
    }
}
