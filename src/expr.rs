//! Access to the live process for evaluating DWARF expressions and frame layouts.

use tracing::trace;

use crate::debuggee::Debuggee;
use crate::errors::{DebuggerError, Result};
use crate::target::Target;
use crate::{Addr, Register};

/// What an expression evaluator may ask of the stopped debuggee
pub trait ExprContext {
    /// Value of a register, by DWARF register number
    fn reg(&self, regnum: gimli::Register) -> Result<u64>;

    /// Current program counter
    fn pc(&self) -> Result<u64>;

    /// Reads `size` bytes (1, 2, 4 or 8) at `addr` as a little endian integer
    fn deref_size(&self, addr: Addr, size: usize) -> Result<u64>;
}

impl<T: Target> ExprContext for Debuggee<T> {
    fn reg(&self, regnum: gimli::Register) -> Result<u64> {
        self.get_reg(Register::try_from(regnum)?)
    }

    fn pc(&self) -> Result<u64> {
        self.get_reg(Register::rip)
    }

    fn deref_size(&self, addr: Addr, size: usize) -> Result<u64> {
        let mask: u64 = match size {
            1 => 0xff,
            2 => 0xffff,
            4 => 0xffff_ffff,
            8 => u64::MAX,
            other => return Err(DebuggerError::UnsupportedDerefSize(other)),
        };
        let word = self.read_memory(addr)? as u64;
        trace!("deref {size} bytes at {addr:#x}: {:#x}", word & mask);
        Ok(word & mask)
    }
}
