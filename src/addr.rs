//! Addresses in the address space of the debuggee
//!
//! An [`Addr`] is either a *runtime* address (what the loaded process uses) or a *static*
//! address (what the ELF symbols and DWARF data describe). They only differ by the load address
//! of position independent executables, see [`crate::resolver::Resolver`].

use std::fmt::{Display, LowerHex};
use std::num::ParseIntError;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use crate::Word;

pub type RawPointer = *mut std::ffi::c_void;

#[derive(Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Addr(usize);

impl Addr {
    pub const NULL: Addr = Addr(0);

    pub fn usize(&self) -> usize {
        self.0
    }
    pub fn u64(&self) -> u64 {
        self.0 as u64
    }
    pub fn raw_pointer(&self) -> RawPointer {
        self.0 as RawPointer
    }

    /// Adds `offset`, wrapping around at the end of the address space
    #[must_use]
    pub fn wrapping_add(self, offset: Addr) -> Addr {
        Addr(self.0.wrapping_add(offset.0))
    }

    /// Adds `offset`, [`None`] if that leaves the address space
    #[must_use]
    pub fn checked_add(self, offset: usize) -> Option<Addr> {
        self.0.checked_add(offset).map(Addr)
    }

    /// Subtracts `offset`, wrapping around at the start of the address space
    #[must_use]
    pub fn wrapping_sub(self, offset: Addr) -> Addr {
        Addr(self.0.wrapping_sub(offset.0))
    }
}

impl Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl std::fmt::Debug for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl LowerHex for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

/// Parses `0x`-prefixed hexadecimal or plain decimal
impl FromStr for Addr {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => usize::from_str_radix(hex, 16)?,
            None => s.parse::<usize>()?,
        };
        Ok(Addr(v))
    }
}

impl Add<usize> for Addr {
    type Output = Self;
    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<usize> for Addr {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs
    }
}

impl Sub<usize> for Addr {
    type Output = Self;
    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl From<RawPointer> for Addr {
    fn from(value: RawPointer) -> Self {
        Addr(value as usize)
    }
}

impl From<Addr> for RawPointer {
    fn from(value: Addr) -> Self {
        value.0 as RawPointer
    }
}

impl From<usize> for Addr {
    fn from(value: usize) -> Self {
        Addr(value)
    }
}

impl From<Word> for Addr {
    fn from(value: Word) -> Self {
        Addr(value as usize)
    }
}

impl From<u64> for Addr {
    fn from(value: u64) -> Self {
        Addr(value as usize)
    }
}

impl From<Addr> for Word {
    fn from(value: Addr) -> Self {
        value.0 as Word
    }
}

impl From<Addr> for u64 {
    fn from(value: Addr) -> Self {
        value.0 as u64
    }
}
