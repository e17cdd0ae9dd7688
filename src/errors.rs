use thiserror::Error;

use crate::addr::Addr;

pub type Result<T> = std::result::Result<T, DebuggerError>;

#[derive(Error, Debug)]
pub enum DebuggerError {
    #[error("Could not access the debuggee: {0}")]
    ProcessAccess(#[from] nix::Error),
    #[error("Could not access debuggee memory at {addr}: {source}")]
    MemoryAccess {
        addr: Addr,
        #[source]
        source: nix::Error,
    },
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("The debuggee has exited")]
    ProcessExited,
    #[error("Unexpected wait status: {0}")]
    UnexpectedWaitStatus(String),
    #[error("Tried to enable a breakpoint that was already enabled")]
    BreakpointIsAlreadyEnabled,
    #[error("Tried to disable a breakpoint that was already disabled")]
    BreakpointIsAlreadyDisabled,
    #[error("Unknown register: {0}")]
    UnknownRegister(String),
    #[error("No register for DWARF register number {0}")]
    UnknownDwarfRegister(u16),
    #[error("Cannot dereference {0} bytes")]
    UnsupportedDerefSize(usize),
    #[error("Bad command: {0}")]
    BadCommand(String),
    #[error("Could not parse number: {0}")]
    BadNumber(String),
    #[error("Executable does not exist: {0}")]
    ExecutableDoesNotExist(String),
    #[error("Executable is not a file: {0}")]
    ExecutableIsNotAFile(String),
    #[error("Could not convert to CString: {0}")]
    CStringConv(#[from] std::ffi::NulError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse the executable: {0}")]
    Object(#[from] object::Error),
    #[error("Could not parse the DWARF debug information: {0}")]
    Gimli(#[from] gimli::Error),
    #[error("Could not find the executable: {0}")]
    Which(#[from] which::Error),
    #[cfg(feature = "cli")]
    #[error("Error with the command line interface: {0}")]
    Dialoguer(#[from] dialoguer::Error),
}
