//! Commands of the debugger, built from already tokenized input.
//!
//! A command word may be abbreviated to any prefix. An exact match wins, otherwise the first
//! command in [`COMMANDS`] that starts with the given word is taken, so `s` is `step` and `b` is
//! `break`.

use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{DebuggerError, Result};
use crate::{Addr, Register, Word};

/// Command words, in the order prefixes are resolved
pub const COMMANDS: &[&str] = &[
    "continue", "break", "delete", "register", "memory", "step", "stepi", "next", "finish",
    "symbol", "info", "maps", "kill", "quit",
];

/// Where to put a breakpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointSpec {
    /// `0x401126`, a runtime address
    Address(Addr),
    /// `main.c:12`
    Line { file: PathBuf, line: u64 },
    /// `main`
    Function(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Continue,
    SetBreakpoint(BreakpointSpec),
    DelBreakpoint(Addr),
    DumpRegisters,
    ReadRegister(Register),
    WriteRegister(Register, u64),
    /// address and optional size in bytes
    ReadMemory(Addr, Option<usize>),
    WriteMemory(Addr, Word),
    StepInto,
    StepSingle,
    StepOver,
    StepOut,
    GetSymbolsByName(String),
    Info,
    ProcMap,
    Kill,
    Quit,
}

impl FromStr for BreakpointSpec {
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("0x") || s.starts_with("0X") {
            return Ok(BreakpointSpec::Address(parse_addr(s)?));
        }
        if let Some((file, line)) = s.rsplit_once(':') {
            return Ok(BreakpointSpec::Line {
                file: PathBuf::from(file),
                line: parse_number(line)?,
            });
        }
        Ok(BreakpointSpec::Function(s.to_string()))
    }
}

fn resolve_word<'a>(word: &str, candidates: &[&'a str]) -> Option<&'a str> {
    if word.is_empty() {
        return None;
    }
    candidates
        .iter()
        .find(|c| **c == word)
        .or_else(|| candidates.iter().find(|c| c.starts_with(word)))
        .copied()
}

/// `0x` prefixed hexadecimal or decimal
pub fn parse_number(s: &str) -> Result<u64> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| DebuggerError::BadNumber(s.to_string()))
}

pub fn parse_addr(s: &str) -> Result<Addr> {
    s.parse::<Addr>()
        .map_err(|_| DebuggerError::BadNumber(s.to_string()))
}

fn arg<'t, S: AsRef<str>>(tokens: &'t [S], idx: usize, what: &str) -> Result<&'t str> {
    tokens
        .get(idx)
        .map(AsRef::as_ref)
        .ok_or_else(|| DebuggerError::BadCommand(format!("missing {what}")))
}

impl Command {
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Command> {
        let word = arg(tokens, 0, "command")?;
        let Some(command) = resolve_word(word, COMMANDS) else {
            return Err(DebuggerError::BadCommand(format!("unknown command: {word}")));
        };

        Ok(match command {
            "continue" => Command::Continue,
            "break" => Command::SetBreakpoint(arg(tokens, 1, "breakpoint location")?.parse()?),
            "delete" => Command::DelBreakpoint(parse_addr(arg(tokens, 1, "address")?)?),
            "register" => {
                let sub = arg(tokens, 1, "dump, read or write")?;
                match resolve_word(sub, &["dump", "read", "write"]) {
                    Some("dump") => Command::DumpRegisters,
                    Some("read") => Command::ReadRegister(arg(tokens, 2, "register")?.parse()?),
                    Some("write") => Command::WriteRegister(
                        arg(tokens, 2, "register")?.parse()?,
                        parse_number(arg(tokens, 3, "value")?)?,
                    ),
                    _ => return Err(DebuggerError::BadCommand(format!("register {sub}"))),
                }
            }
            "memory" => {
                let sub = arg(tokens, 1, "read or write")?;
                let addr = parse_addr(arg(tokens, 2, "address")?)?;
                match resolve_word(sub, &["read", "write"]) {
                    Some("read") => {
                        let size = match tokens.get(3) {
                            Some(s) => Some(parse_number(s.as_ref())? as usize),
                            None => None,
                        };
                        Command::ReadMemory(addr, size)
                    }
                    Some("write") => {
                        Command::WriteMemory(addr, parse_number(arg(tokens, 3, "value")?)? as Word)
                    }
                    _ => return Err(DebuggerError::BadCommand(format!("memory {sub}"))),
                }
            }
            "step" => Command::StepInto,
            "stepi" => Command::StepSingle,
            "next" => Command::StepOver,
            "finish" => Command::StepOut,
            "symbol" => Command::GetSymbolsByName(arg(tokens, 1, "symbol name")?.to_string()),
            "info" => Command::Info,
            "maps" => Command::ProcMap,
            "kill" => Command::Kill,
            "quit" => Command::Quit,
            _ => unreachable!("every command word is handled"),
        })
    }
}
