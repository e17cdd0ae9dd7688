//! # Target Module
//!
//! The seam between the debugger and the kernel.
//!
//! [`Target`] lists the primitive operations the debugger needs from a traced process: word
//! sized memory access, register access, resuming, single stepping, waiting for the next stop
//! and reading the memory map. [`PtraceTarget`] implements them for a real child process with
//! [ptrace](nix::sys::ptrace). Everything above this module (breakpoints, stepping, symbol
//! resolution) only talks to the trait.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execv, fork, ForkResult, Pid};
use tracing::{debug, error, info, trace};

use crate::errors::{DebuggerError, Result};
use crate::memorymap::ProcessMemoryMap;
use crate::{Addr, Register, Word};

/// What the kernel reported when the debuggee changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStop {
    /// Stopped by a signal, `code` is the `si_code` of its siginfo
    Signal { signal: Signal, code: i32 },
    /// Exited normally with this exit code
    Exited(i32),
    /// Terminated by this signal
    Killed(Signal),
}

/// Primitive process control for a single traced process
///
/// All methods except [`Target::wait`] require the process to be stopped. The engine in
/// [`crate::debuggee::Debuggee`] guarantees that ordering.
pub trait Target {
    fn pid(&self) -> Pid;

    /// The executable the process was started from, if known
    fn executable(&self) -> Option<&Path>;

    /// Reads one [`Word`], failing with [`DebuggerError::MemoryAccess`]
    fn read_word(&self, addr: Addr) -> Result<Word>;

    /// Writes one [`Word`], failing with [`DebuggerError::MemoryAccess`]
    fn write_word(&mut self, addr: Addr, value: Word) -> Result<()>;

    /// Reads a register, failing with [`DebuggerError::ProcessAccess`]
    fn read_register(&self, reg: Register) -> Result<u64>;

    /// Writes a register, failing with [`DebuggerError::ProcessAccess`]
    fn write_register(&mut self, reg: Register, value: u64) -> Result<()>;

    /// Lets the process run until the next stop. Does not wait.
    fn resume(&mut self) -> Result<()>;

    /// Lets the process execute a single instruction. Does not wait.
    fn step(&mut self) -> Result<()>;

    /// Blocks until the process changes state
    fn wait(&mut self) -> Result<RawStop>;

    fn memory_map(&self) -> Result<ProcessMemoryMap>;

    fn kill(&mut self) -> Result<()>;

    fn detach(&mut self) -> Result<()>;
}

/// A child process traced with ptrace
#[derive(Debug)]
pub struct PtraceTarget {
    pid: Pid,
    executable: PathBuf,
}

impl PtraceTarget {
    /// Starts `program` as a traced child and waits until it stops at its first instruction
    ///
    /// Bare program names are looked up in `PATH`. Address space layout randomization is
    /// disabled for the child, so the load address of a position independent executable is the
    /// same in every session.
    ///
    /// # Errors
    ///
    /// Fails if the executable cannot be found, if forking fails or if the child does not reach
    /// its initial stop.
    pub fn launch(program: impl AsRef<Path>, args: &[CString]) -> Result<Self> {
        let program = program.as_ref();
        let path: PathBuf = if program.components().count() == 1 && !program.exists() {
            which::which(program)?
        } else {
            program.to_owned()
        };
        if !path.exists() {
            let err = DebuggerError::ExecutableDoesNotExist(path.to_string_lossy().to_string());
            error!("{err}");
            return Err(err);
        }
        if !path.is_file() {
            let err = DebuggerError::ExecutableIsNotAFile(path.to_string_lossy().to_string());
            error!("{err}");
            return Err(err);
        }

        // /proc/<pid>/maps names the executable by its canonical path
        let path = std::fs::canonicalize(&path)?;
        let cpath = CString::new(path.to_string_lossy().to_string().as_str())?;
        let mut argv = vec![cpath.clone()];
        argv.extend_from_slice(args);

        // SAFETY: the child only calls async-signal-safe functions before exec or exit
        let fork_res = unsafe { fork() };
        match fork_res {
            Err(e) => {
                error!("could not start executable: {e}");
                Err(e.into())
            }
            Ok(ForkResult::Child) => {
                let err = Self::exec_traced(&cpath, &argv);
                eprintln!("could not exec the debuggee: {err}");
                std::process::exit(127)
            }
            Ok(ForkResult::Parent { child: pid }) => {
                info!("started debuggee {} as pid {pid}", path.display());
                match waitpid(pid, None)? {
                    WaitStatus::Stopped(_, Signal::SIGTRAP) => {
                        debug!("debuggee is stopped at its first instruction");
                        Ok(Self {
                            pid,
                            executable: path,
                        })
                    }
                    WaitStatus::Exited(..) | WaitStatus::Signaled(..) => {
                        error!("debuggee ended before it could be traced");
                        Err(DebuggerError::ProcessExited)
                    }
                    other => Err(DebuggerError::UnexpectedWaitStatus(format!("{other:?}"))),
                }
            }
        }
    }

    fn exec_traced(path: &CString, argv: &[CString]) -> DebuggerError {
        if let Err(e) = personality::set(Persona::ADDR_NO_RANDOMIZE) {
            return e.into();
        }
        if let Err(e) = ptrace::traceme() {
            return e.into();
        }
        match execv(path, argv) {
            Err(e) => e.into(),
            Ok(never) => match never {},
        }
    }
}

impl Target for PtraceTarget {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn executable(&self) -> Option<&Path> {
        Some(&self.executable)
    }

    fn read_word(&self, addr: Addr) -> Result<Word> {
        let w = ptrace::read(self.pid, addr.into())
            .map_err(|source| DebuggerError::MemoryAccess { addr, source })?;
        trace!("read {w:#018x} at {addr}");
        Ok(w)
    }

    fn write_word(&mut self, addr: Addr, value: Word) -> Result<()> {
        trace!("write {value:#018x} at {addr}");
        ptrace::write(self.pid, addr.into(), value)
            .map_err(|source| DebuggerError::MemoryAccess { addr, source })
    }

    fn read_register(&self, reg: Register) -> Result<u64> {
        let regs = ptrace::getregs(self.pid)?;
        Ok(reg.get(&regs))
    }

    fn write_register(&mut self, reg: Register, value: u64) -> Result<()> {
        let mut regs = ptrace::getregs(self.pid)?;
        reg.set(&mut regs, value);
        ptrace::setregs(self.pid, regs)?;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        ptrace::cont(self.pid, None)?;
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        ptrace::step(self.pid, None)?;
        Ok(())
    }

    fn wait(&mut self) -> Result<RawStop> {
        match waitpid(self.pid, None)? {
            WaitStatus::Stopped(_, signal) => {
                let info = ptrace::getsiginfo(self.pid)?;
                Ok(RawStop::Signal {
                    signal,
                    code: info.si_code,
                })
            }
            WaitStatus::Exited(_, code) => Ok(RawStop::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Ok(RawStop::Killed(signal)),
            other => Err(DebuggerError::UnexpectedWaitStatus(format!("{other:?}"))),
        }
    }

    fn memory_map(&self) -> Result<ProcessMemoryMap> {
        Ok(proc_maps::get_process_maps(self.pid.into())?.into())
    }

    fn kill(&mut self) -> Result<()> {
        ptrace::kill(self.pid)?;
        // reap the child so it does not linger as a zombie
        let status = waitpid(self.pid, None)?;
        debug!("debuggee was killed: {status:?}");
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        ptrace::detach(self.pid, None)?;
        info!("detached from {}", self.pid);
        Ok(())
    }
}
