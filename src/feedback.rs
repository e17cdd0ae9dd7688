use std::fmt::Display;

use crate::dbginfo::ElfSymbol;
use crate::debuggee::StopEvent;
use crate::errors::DebuggerError;
use crate::{Addr, Register, Word};

/// The result of a command, for the [`crate::ui::DebuggerUI`] to present
#[derive(Debug)]
pub enum Feedback {
    Ok,
    Text(String),
    Word(Word),
    Registers(Vec<(Register, u64)>),
    Stopped(StopEvent),
    BreakpointSet(Addr),
    Symbols(Vec<ElfSymbol>),
    Error(DebuggerError),
}

impl Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feedback::Ok => write!(f, "Ok")?,
            Feedback::Error(e) => write!(f, "Error: {e}")?,
            Feedback::Text(t) => write!(f, "{t}")?,
            Feedback::Word(w) => write!(f, "{w:#018x}")?,
            Feedback::Stopped(event) => write!(f, "{event}")?,
            Feedback::BreakpointSet(addr) => write!(f, "Set breakpoint at address {addr:#x}")?,
            Feedback::Registers(regs) => {
                for (i, (r, v)) in regs.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{:<8} {v:#018x}", r.name())?;
                }
            }
            Feedback::Symbols(syms) => {
                if syms.is_empty() {
                    write!(f, "No symbols found")?;
                }
                for (i, s) in syms.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(
                        f,
                        "{:#} {} {:#x}",
                        rustc_demangle::demangle(&s.name),
                        s.kind,
                        s.addr
                    )?;
                }
            }
        }

        Ok(())
    }
}

impl From<Result<Feedback, DebuggerError>> for Feedback {
    fn from(value: Result<Feedback, DebuggerError>) -> Self {
        match value {
            Ok(f) => f,
            Err(e) => Feedback::Error(e),
        }
    }
}
