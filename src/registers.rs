//! # Register Access
//!
//! Typed names for the x86_64 registers of a traced process.
//!
//! The kernel keeps the register file of a stopped tracee; this module only maps a [`Register`]
//! onto the matching field of [`user_regs_struct`] and onto its DWARF register number. Reading and
//! writing goes through [`crate::target::Target::read_register`] and
//! [`crate::target::Target::write_register`].

use std::fmt::Display;
use std::str::FromStr;

use nix::libc::user_regs_struct;

use crate::errors::{DebuggerError, Result};

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    r15,
    r14,
    r13,
    r12,
    rbp,
    rbx,
    r11,
    r10,
    r9,
    r8,
    rax,
    rcx,
    rdx,
    rsi,
    rdi,
    orig_rax,
    rip,
    cs,
    eflags,
    rsp,
    ss,
    fs_base,
    gs_base,
    ds,
    es,
    fs,
    gs,
}

impl Register {
    /// Every register, in the order of [`user_regs_struct`]
    pub const ALL: [Register; 27] = [
        Register::r15,
        Register::r14,
        Register::r13,
        Register::r12,
        Register::rbp,
        Register::rbx,
        Register::r11,
        Register::r10,
        Register::r9,
        Register::r8,
        Register::rax,
        Register::rcx,
        Register::rdx,
        Register::rsi,
        Register::rdi,
        Register::orig_rax,
        Register::rip,
        Register::cs,
        Register::eflags,
        Register::rsp,
        Register::ss,
        Register::fs_base,
        Register::gs_base,
        Register::ds,
        Register::es,
        Register::fs,
        Register::gs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Register::r15 => "r15",
            Register::r14 => "r14",
            Register::r13 => "r13",
            Register::r12 => "r12",
            Register::rbp => "rbp",
            Register::rbx => "rbx",
            Register::r11 => "r11",
            Register::r10 => "r10",
            Register::r9 => "r9",
            Register::r8 => "r8",
            Register::rax => "rax",
            Register::rcx => "rcx",
            Register::rdx => "rdx",
            Register::rsi => "rsi",
            Register::rdi => "rdi",
            Register::orig_rax => "orig_rax",
            Register::rip => "rip",
            Register::cs => "cs",
            Register::eflags => "eflags",
            Register::rsp => "rsp",
            Register::ss => "ss",
            Register::fs_base => "fs_base",
            Register::gs_base => "gs_base",
            Register::ds => "ds",
            Register::es => "es",
            Register::fs => "fs",
            Register::gs => "gs",
        }
    }

    /// Reads this register out of a register file fetched with `PTRACE_GETREGS`
    pub fn get(&self, regs: &user_regs_struct) -> u64 {
        match self {
            Register::r15 => regs.r15,
            Register::r14 => regs.r14,
            Register::r13 => regs.r13,
            Register::r12 => regs.r12,
            Register::rbp => regs.rbp,
            Register::rbx => regs.rbx,
            Register::r11 => regs.r11,
            Register::r10 => regs.r10,
            Register::r9 => regs.r9,
            Register::r8 => regs.r8,
            Register::rax => regs.rax,
            Register::rcx => regs.rcx,
            Register::rdx => regs.rdx,
            Register::rsi => regs.rsi,
            Register::rdi => regs.rdi,
            Register::orig_rax => regs.orig_rax,
            Register::rip => regs.rip,
            Register::cs => regs.cs,
            Register::eflags => regs.eflags,
            Register::rsp => regs.rsp,
            Register::ss => regs.ss,
            Register::fs_base => regs.fs_base,
            Register::gs_base => regs.gs_base,
            Register::ds => regs.ds,
            Register::es => regs.es,
            Register::fs => regs.fs,
            Register::gs => regs.gs,
        }
    }

    /// Writes this register into a register file that will be stored with `PTRACE_SETREGS`
    pub fn set(&self, regs: &mut user_regs_struct, value: u64) {
        let field = match self {
            Register::r15 => &mut regs.r15,
            Register::r14 => &mut regs.r14,
            Register::r13 => &mut regs.r13,
            Register::r12 => &mut regs.r12,
            Register::rbp => &mut regs.rbp,
            Register::rbx => &mut regs.rbx,
            Register::r11 => &mut regs.r11,
            Register::r10 => &mut regs.r10,
            Register::r9 => &mut regs.r9,
            Register::r8 => &mut regs.r8,
            Register::rax => &mut regs.rax,
            Register::rcx => &mut regs.rcx,
            Register::rdx => &mut regs.rdx,
            Register::rsi => &mut regs.rsi,
            Register::rdi => &mut regs.rdi,
            Register::orig_rax => &mut regs.orig_rax,
            Register::rip => &mut regs.rip,
            Register::cs => &mut regs.cs,
            Register::eflags => &mut regs.eflags,
            Register::rsp => &mut regs.rsp,
            Register::ss => &mut regs.ss,
            Register::fs_base => &mut regs.fs_base,
            Register::gs_base => &mut regs.gs_base,
            Register::ds => &mut regs.ds,
            Register::es => &mut regs.es,
            Register::fs => &mut regs.fs,
            Register::gs => &mut regs.gs,
        };
        *field = value;
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Register {
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self> {
        Register::ALL
            .iter()
            .find(|r| r.name() == s)
            .copied()
            .ok_or_else(|| DebuggerError::UnknownRegister(s.to_string()))
    }
}

/// Maps System V x86_64 DWARF register numbers
///
/// The return address column (16) has no counterpart in [`user_regs_struct`] and is rejected.
impl TryFrom<gimli::Register> for Register {
    type Error = DebuggerError;

    fn try_from(value: gimli::Register) -> Result<Self> {
        Ok(match value.0 {
            0 => Register::rax,
            1 => Register::rdx,
            2 => Register::rcx,
            3 => Register::rbx,
            4 => Register::rsi,
            5 => Register::rdi,
            6 => Register::rbp,
            7 => Register::rsp,
            8 => Register::r8,
            9 => Register::r9,
            10 => Register::r10,
            11 => Register::r11,
            12 => Register::r12,
            13 => Register::r13,
            14 => Register::r14,
            15 => Register::r15,
            49 => Register::eflags,
            50 => Register::es,
            51 => Register::cs,
            52 => Register::ss,
            53 => Register::ds,
            54 => Register::fs,
            55 => Register::gs,
            58 => Register::fs_base,
            59 => Register::gs_base,
            other => return Err(DebuggerError::UnknownDwarfRegister(other)),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_register_names_roundtrip() {
        for r in Register::ALL {
            assert_eq!(r.to_string().parse::<Register>().unwrap(), r);
        }
        assert!(matches!(
            "xmm0".parse::<Register>(),
            Err(DebuggerError::UnknownRegister(_))
        ));
    }

    #[test]
    fn test_register_get_set() {
        // SAFETY: user_regs_struct is plain old data, all zeroes is a valid value
        let mut regs: user_regs_struct = unsafe { std::mem::zeroed() };
        Register::rip.set(&mut regs, 0x1135);
        Register::rbp.set(&mut regs, 0x7ffe_0000);
        assert_eq!(regs.rip, 0x1135);
        assert_eq!(Register::rip.get(&regs), 0x1135);
        assert_eq!(Register::rbp.get(&regs), 0x7ffe_0000);
        assert_eq!(Register::rax.get(&regs), 0);
    }

    #[test]
    fn test_dwarf_register_numbers() {
        assert_eq!(Register::try_from(gimli::Register(6)).unwrap(), Register::rbp);
        assert_eq!(Register::try_from(gimli::Register(7)).unwrap(), Register::rsp);
        assert_eq!(Register::try_from(gimli::Register(15)).unwrap(), Register::r15);
        assert!(matches!(
            Register::try_from(gimli::Register(16)),
            Err(DebuggerError::UnknownDwarfRegister(16))
        ));
    }
}
