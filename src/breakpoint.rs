//! # Breakpoint Manager
//!
//! Software breakpoints are implemented by replacing the first byte of an instruction with
//! `int3` (`0xcc`). The replaced byte is kept in the [`Breakpoint`] so it can be put back.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::errors::{DebuggerError, Result};
use crate::target::Target;
use crate::{Addr, Word};

pub const MASK_ALL: Word = -1; // yup for real, two's complement
pub const INT3_BYTE: u8 = 0xcc;
pub const INT3: Word = INT3_BYTE as Word;
pub const WORD_MASK: Word = 0x00000000000000ff;
pub const WORD_MASK_INV: Word = MASK_ALL ^ WORD_MASK;

/// Width of the trap instruction; the program counter is this far past the breakpoint after
/// the trap fired
pub const TRAP_WIDTH: usize = 1;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Breakpoint {
    addr: Addr,
    /// The original byte at `addr`, present exactly while the breakpoint is enabled
    saved_data: Option<u8>,
}

impl Breakpoint {
    pub fn new(addr: Addr) -> Self {
        Self {
            addr,
            saved_data: None,
        }
    }

    #[inline]
    pub fn addr(&self) -> Addr {
        self.addr
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.saved_data.is_some()
    }

    #[inline]
    pub fn saved_data(&self) -> Option<u8> {
        self.saved_data
    }

    /// Writes the trap byte, keeping the original byte
    ///
    /// If reading or writing the memory fails, the breakpoint stays disabled.
    pub fn enable<T: Target + ?Sized>(&mut self, target: &mut T) -> Result<()> {
        if self.is_enabled() {
            return Err(DebuggerError::BreakpointIsAlreadyEnabled);
        }

        let data_word: Word = target.read_word(self.addr)?;
        trace!("original word: {data_word:016x}");
        let saved = (data_word & WORD_MASK) as u8;
        let data_word_modified: Word = (data_word & WORD_MASK_INV) | INT3;
        trace!("modified word: {data_word_modified:016x}");
        target.write_word(self.addr, data_word_modified)?;
        self.saved_data = Some(saved);

        Ok(())
    }

    /// Puts the original byte back
    ///
    /// If reading or writing the memory fails, the breakpoint stays enabled.
    pub fn disable<T: Target + ?Sized>(&mut self, target: &mut T) -> Result<()> {
        let saved = match self.saved_data {
            Some(s) => s,
            None => return Err(DebuggerError::BreakpointIsAlreadyDisabled),
        };

        let data_word: Word = target.read_word(self.addr)?;
        trace!("breakpo: {data_word:016x}");
        let data_word_restored: Word = (data_word & WORD_MASK_INV) | saved as Word;
        trace!("restore: {data_word_restored:016x}");
        target.write_word(self.addr, data_word_restored)?;
        self.saved_data = None;

        Ok(())
    }
}

/// All breakpoints of a session, at most one per address
#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    inner: HashMap<Addr, Breakpoint>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: Addr) -> Option<&Breakpoint> {
        self.inner.get(&addr)
    }

    pub fn get_mut(&mut self, addr: Addr) -> Option<&mut Breakpoint> {
        self.inner.get_mut(&addr)
    }

    #[inline]
    pub fn contains(&self, addr: Addr) -> bool {
        self.inner.contains_key(&addr)
    }

    pub fn is_enabled_at(&self, addr: Addr) -> bool {
        self.get(addr).is_some_and(Breakpoint::is_enabled)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.inner.values()
    }

    /// Installs an enabled breakpoint at `addr`
    ///
    /// Returns `false` without touching the memory if there already is a breakpoint at `addr`.
    /// A disabled breakpoint at that address is enabled again.
    pub fn insert<T: Target + ?Sized>(&mut self, target: &mut T, addr: Addr) -> Result<bool> {
        if let Some(bp) = self.inner.get_mut(&addr) {
            if !bp.is_enabled() {
                bp.enable(target)?;
            }
            debug!("breakpoint at {addr} already exists");
            return Ok(false);
        }

        let mut bp = Breakpoint::new(addr);
        bp.enable(target)?;
        self.inner.insert(addr, bp);
        Ok(true)
    }

    /// Disables the breakpoint at `addr` and forgets it
    ///
    /// Removing an address without a breakpoint does nothing. If restoring the original byte
    /// fails, the breakpoint stays in the table.
    pub fn remove<T: Target + ?Sized>(&mut self, target: &mut T, addr: Addr) -> Result<()> {
        match self.inner.get_mut(&addr) {
            None => {
                warn!("removed a breakpoint at {addr} that did not exist");
                return Ok(());
            }
            Some(bp) if bp.is_enabled() => bp.disable(target)?,
            Some(_) => (),
        }
        self.inner.remove(&addr);
        Ok(())
    }

    /// Forgets every breakpoint without touching the memory, for when the process is gone
    pub fn forget_all(&mut self) {
        self.inner.clear();
    }

    /// Restores the original bytes of every enabled breakpoint
    pub fn disable_all<T: Target + ?Sized>(&mut self, target: &mut T) -> Result<()> {
        for bp in self.inner.values_mut().filter(|bp| bp.is_enabled()) {
            bp.disable(target)?;
        }
        Ok(())
    }
}
