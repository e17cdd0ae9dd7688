//! # ptdbg
//!
//! A small source-level debugger for native x86_64 Linux programs.
//!
//! The crate attaches to a traced child process through [ptrace](nix::sys::ptrace), patches
//! software breakpoints into its memory, steps and resumes it, and maps raw instruction pointers
//! to functions, source lines and symbols using DWARF debug information.
//!
//! The main entry point is [`debugger::Debugger`], which combines:
//!
//! - a [`target::Target`] (the live process, usually a [`target::PtraceTarget`]),
//! - a [`dbginfo::DebugInfo`] capability (usually an [`dbginfo::ElfDebugInfo`]),
//! - a [`ui::DebuggerUI`] that supplies commands and presents results.

pub mod addr;
pub mod breakpoint;
pub mod command;
pub mod consts;
pub mod dbginfo;
pub mod debuggee;
pub mod debugger;
pub mod errors;
pub mod expr;
pub mod feedback;
pub mod memorymap;
pub mod registers;
pub mod resolver;
pub mod source;
pub mod target;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use addr::Addr;
pub use errors::{DebuggerError, Result};
pub use registers::Register;

/// A machine word as transferred by `PTRACE_PEEKDATA` and `PTRACE_POKEDATA`
pub type Word = i64;

/// Size of a [`Word`] in bytes
pub const WORD_BYTES: usize = std::mem::size_of::<Word>();
