//! # Debuggee Module
//!
//! The traced process and its breakpoints.
//!
//! [`Debuggee`] owns the [`Target`] and the [`BreakpointTable`], tracks whether the process is
//! stopped, running or gone, and implements process control: resuming, single stepping, and
//! turning whatever the kernel reports into a [`StopEvent`]. The breakpoint-aware variants of
//! stepping and continuing live here too, since they need both the process and the breakpoints.

use std::fmt::Display;

use nix::sys::signal::Signal;
use tracing::{debug, info, trace, warn};

use crate::breakpoint::{BreakpointTable, TRAP_WIDTH};
use crate::consts::{SI_KERNEL, TRAP_BRKPT, TRAP_TRACE};
use crate::errors::{DebuggerError, Result};
use crate::target::{RawStop, Target};
use crate::{Addr, Register, Word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Running,
    /// Exited, killed or detached; the process can no longer be controlled
    Exited,
}

/// Why the debuggee stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopEvent {
    /// One of our breakpoints fired, the program counter was moved back onto it
    HitBreakpoint(Addr),
    /// A single step finished
    SteppedOk,
    /// `SIGSEGV` with this `si_code`. The process is still attached, but its state is not
    /// trustworthy anymore.
    Crashed(i32),
    /// A `SIGTRAP` that is neither a single step nor one of our breakpoints
    OtherTrap(i32),
    /// Any other signal
    UnhandledSignal(Signal),
    Exited(i32),
    Killed(Signal),
}

pub struct Debuggee<T: Target> {
    pub(crate) target: T,
    pub(crate) breakpoints: BreakpointTable,
    state: ProcessState,
}

impl Display for StopEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopEvent::HitBreakpoint(addr) => write!(f, "Hit breakpoint at address {addr:#x}"),
            StopEvent::SteppedOk => write!(f, "Stepped"),
            StopEvent::Crashed(code) => write!(f, "Segmentation fault, reason: {code}"),
            StopEvent::OtherTrap(code) => write!(f, "Trapped with SIGTRAP code {code}"),
            StopEvent::UnhandledSignal(sig) => write!(f, "Got signal {sig}"),
            StopEvent::Exited(code) => write!(f, "Debuggee exited with code {code}"),
            StopEvent::Killed(sig) => write!(f, "Debuggee was killed by {sig}"),
        }
    }
}

impl StopEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StopEvent::Exited(_) | StopEvent::Killed(_))
    }
}

impl<T: Target> Debuggee<T> {
    /// Wraps a target that is currently stopped
    pub fn new(target: T) -> Self {
        Self {
            target,
            breakpoints: BreakpointTable::new(),
            state: ProcessState::Stopped,
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.state != ProcessState::Exited
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(DebuggerError::ProcessExited)
        }
    }

    fn mark_exited(&mut self) {
        self.state = ProcessState::Exited;
        // the memory the trap bytes were written to is gone
        self.breakpoints.forget_all();
    }

    pub fn get_reg(&self, reg: Register) -> Result<u64> {
        self.ensure_alive()?;
        self.target.read_register(reg)
    }

    pub fn set_reg(&mut self, reg: Register, value: u64) -> Result<()> {
        self.ensure_alive()?;
        self.target.write_register(reg, value)
    }

    pub fn get_pc(&self) -> Result<Addr> {
        Ok(self.get_reg(Register::rip)?.into())
    }

    pub fn set_pc(&mut self, pc: Addr) -> Result<()> {
        self.set_reg(Register::rip, pc.u64())
    }

    /// Every register with its current value
    pub fn dump_registers(&self) -> Result<Vec<(Register, u64)>> {
        Register::ALL
            .iter()
            .map(|r| Ok((*r, self.get_reg(*r)?)))
            .collect()
    }

    pub fn read_memory(&self, addr: Addr) -> Result<Word> {
        self.ensure_alive()?;
        self.target.read_word(addr)
    }

    pub fn write_memory(&mut self, addr: Addr, value: Word) -> Result<()> {
        self.ensure_alive()?;
        self.target.write_word(addr, value)
    }

    /// Installs a breakpoint, `false` if there already was one at `addr`
    pub fn set_breakpoint(&mut self, addr: Addr) -> Result<bool> {
        self.ensure_alive()?;
        let added = self.breakpoints.insert(&mut self.target, addr)?;
        if added {
            info!("set breakpoint at address {addr:#x}");
        }
        Ok(added)
    }

    pub fn remove_breakpoint(&mut self, addr: Addr) -> Result<()> {
        self.ensure_alive()?;
        self.breakpoints.remove(&mut self.target, addr)
    }

    /// Blocks until the kernel reports the next state change of the debuggee
    pub fn wait_for_stop(&mut self) -> Result<StopEvent> {
        let event = match self.target.wait()? {
            RawStop::Exited(code) => {
                self.mark_exited();
                StopEvent::Exited(code)
            }
            RawStop::Killed(sig) => {
                self.mark_exited();
                StopEvent::Killed(sig)
            }
            RawStop::Signal {
                signal: Signal::SIGTRAP,
                code,
            } => {
                self.state = ProcessState::Stopped;
                self.handle_sigtrap(code)?
            }
            RawStop::Signal {
                signal: Signal::SIGSEGV,
                code,
            } => {
                self.state = ProcessState::Stopped;
                StopEvent::Crashed(code)
            }
            RawStop::Signal { signal, .. } => {
                self.state = ProcessState::Stopped;
                StopEvent::UnhandledSignal(signal)
            }
        };
        debug!("debuggee stopped: {event}");
        Ok(event)
    }

    fn handle_sigtrap(&mut self, code: i32) -> Result<StopEvent> {
        match code {
            SI_KERNEL | TRAP_BRKPT => {
                // the trap fires after the int3 was executed
                let pc = self.get_pc()? - TRAP_WIDTH;
                if !self.breakpoints.contains(pc) {
                    warn!("the debuggee trapped at {pc:#x}, but there is no breakpoint there");
                    return Ok(StopEvent::OtherTrap(code));
                }
                self.set_pc(pc)?;
                Ok(StopEvent::HitBreakpoint(pc))
            }
            TRAP_TRACE => Ok(StopEvent::SteppedOk),
            other => {
                debug!("unknown SIGTRAP code {other}");
                Ok(StopEvent::OtherTrap(other))
            }
        }
    }

    /// Executes exactly one instruction, ignoring breakpoints
    pub fn single_step(&mut self) -> Result<StopEvent> {
        self.ensure_alive()?;
        self.target.step()?;
        self.state = ProcessState::Running;
        self.wait_for_stop()
    }

    /// Moves past an enabled breakpoint at the program counter, if there is one
    ///
    /// The breakpoint is disabled for one single step and enabled again afterwards, unless the
    /// debuggee did not survive the step. Returns [`None`] if there was nothing to step over.
    pub fn step_over_breakpoint_if_present(&mut self) -> Result<Option<StopEvent>> {
        let pc = self.get_pc()?;
        let Some(bp) = self.breakpoints.get_mut(pc) else {
            return Ok(None);
        };
        if !bp.is_enabled() {
            return Ok(None);
        }

        trace!("stepping over the breakpoint at {pc:#x}");
        bp.disable(&mut self.target)?;
        let event = self.single_step();
        if self.is_alive() {
            if let Some(bp) = self.breakpoints.get_mut(pc) {
                bp.enable(&mut self.target)?;
            }
        }
        event.map(Some)
    }

    /// Executes one instruction, even if a breakpoint sits on it
    pub fn single_instruction_step_checked(&mut self) -> Result<StopEvent> {
        match self.step_over_breakpoint_if_present()? {
            Some(event) => Ok(event),
            None => self.single_step(),
        }
    }

    /// Runs until the next breakpoint, signal or exit
    pub fn continue_execution(&mut self) -> Result<StopEvent> {
        self.ensure_alive()?;
        if let Some(event) = self.step_over_breakpoint_if_present()? {
            if event != StopEvent::SteppedOk {
                return Ok(event);
            }
        }
        self.target.resume()?;
        self.state = ProcessState::Running;
        self.wait_for_stop()
    }

    pub fn kill(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.target.kill()?;
        info!("killed the debuggee");
        self.mark_exited();
        Ok(())
    }

    /// Restores all original instructions and lets the process run on untraced
    pub fn detach(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.breakpoints.disable_all(&mut self.target)?;
        self.target.detach()?;
        self.mark_exited();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::breakpoint::INT3_BYTE;
    use crate::consts::SEGV_MAPERR;
    use crate::testing::{fixture_target, rt, MockTarget};

    fn debuggee() -> Debuggee<MockTarget> {
        Debuggee::new(fixture_target())
    }

    #[test]
    fn test_continue_hits_breakpoint_and_rewinds() {
        let mut d = debuggee();
        d.set_breakpoint(rt(0x1146)).unwrap();
        let ev = d.continue_execution().unwrap();
        assert_eq!(ev, StopEvent::HitBreakpoint(rt(0x1146)));
        assert_eq!(d.get_pc().unwrap(), rt(0x1146));
        assert_eq!(d.state(), ProcessState::Stopped);
    }

    #[test]
    fn test_continue_from_breakpoint_keeps_it_enabled() {
        let mut d = debuggee();
        d.set_breakpoint(rt(0x1129)).unwrap();
        d.set_breakpoint(rt(0x1150)).unwrap();
        // sitting on the breakpoint at 0x1129 must not trap again
        let ev = d.continue_execution().unwrap();
        assert_eq!(ev, StopEvent::HitBreakpoint(rt(0x1150)));
        assert!(d.breakpoints().is_enabled_at(rt(0x1129)));
        assert_eq!(d.target().byte(rt(0x1129)), INT3_BYTE);
    }

    #[test]
    fn test_step_over_breakpoint_if_present() {
        let mut d = debuggee();
        assert_eq!(d.step_over_breakpoint_if_present().unwrap(), None);
        assert_eq!(d.get_pc().unwrap(), rt(0x1129));

        d.set_breakpoint(rt(0x1129)).unwrap();
        let ev = d.step_over_breakpoint_if_present().unwrap();
        assert_eq!(ev, Some(StopEvent::SteppedOk));
        assert_eq!(d.get_pc().unwrap(), rt(0x112d));
        assert!(d.breakpoints().is_enabled_at(rt(0x1129)));
        assert_eq!(d.target().byte(rt(0x1129)), INT3_BYTE);
    }

    #[test]
    fn test_raw_single_step_onto_breakpoint_traps() {
        let mut d = debuggee();
        d.set_breakpoint(rt(0x1129)).unwrap();
        assert_eq!(
            d.single_step().unwrap(),
            StopEvent::HitBreakpoint(rt(0x1129))
        );
        assert_eq!(
            d.single_instruction_step_checked().unwrap(),
            StopEvent::SteppedOk
        );
        assert_eq!(d.get_pc().unwrap(), rt(0x112d));
    }

    #[test]
    fn test_exit_is_terminal() {
        let mut d = debuggee();
        d.set_breakpoint(rt(0x1168)).unwrap();
        d.set_pc(rt(0x1141)).unwrap();
        let ev = d.continue_execution().unwrap();
        assert_eq!(ev, StopEvent::Exited(0));
        assert!(ev.is_terminal());
        assert!(!d.is_alive());
        assert!(d.breakpoints().is_empty());
        assert!(matches!(
            d.read_memory(rt(0x1129)),
            Err(DebuggerError::ProcessExited)
        ));
        assert!(matches!(
            d.continue_execution(),
            Err(DebuggerError::ProcessExited)
        ));
        assert!(matches!(d.get_pc(), Err(DebuggerError::ProcessExited)));
    }

    #[test]
    fn test_segfault_is_reported_and_process_stays_attached() {
        let mut d = debuggee();
        d.target.faults.insert(rt(0x1150), (Signal::SIGSEGV, SEGV_MAPERR));
        let ev = d.continue_execution().unwrap();
        assert_eq!(ev, StopEvent::Crashed(SEGV_MAPERR));
        assert!(d.is_alive());
        assert_eq!(d.get_pc().unwrap(), rt(0x1150));
        assert_eq!(d.read_memory(rt(0x1129)).unwrap(), 0x9090_9090_9090_9090u64 as Word);
    }

    #[test]
    fn test_other_signals_are_reported() {
        let mut d = debuggee();
        d.target.faults.insert(rt(0x1139), (Signal::SIGUSR1, 0));
        assert_eq!(
            d.continue_execution().unwrap(),
            StopEvent::UnhandledSignal(Signal::SIGUSR1)
        );
        assert_eq!(d.state(), ProcessState::Stopped);
    }

    #[test]
    fn test_trap_brkpt_hits_breakpoint() {
        let mut d = debuggee();
        d.target.trap_code = TRAP_BRKPT;
        d.set_breakpoint(rt(0x1146)).unwrap();
        assert_eq!(
            d.continue_execution().unwrap(),
            StopEvent::HitBreakpoint(rt(0x1146))
        );
        assert_eq!(d.get_pc().unwrap(), rt(0x1146));

        // without a breakpoint in the table the trap is not ours
        d.target.map_bytes(rt(0x1150).usize(), &[INT3_BYTE]);
        assert_eq!(
            d.continue_execution().unwrap(),
            StopEvent::OtherTrap(TRAP_BRKPT)
        );
        assert_eq!(d.get_pc().unwrap(), rt(0x1151));
    }

    #[test]
    fn test_foreign_int3_is_not_rewound() {
        let mut d = debuggee();
        d.target.map_bytes(rt(0x1139).usize(), &[INT3_BYTE]);
        let ev = d.continue_execution().unwrap();
        assert_eq!(ev, StopEvent::OtherTrap(SI_KERNEL));
        assert_eq!(d.get_pc().unwrap(), rt(0x113a));
    }

    #[test]
    fn test_detach_restores_memory() {
        let mut d = debuggee();
        d.set_breakpoint(rt(0x1146)).unwrap();
        d.detach().unwrap();
        assert!(d.target().detached);
        assert_eq!(d.target().byte(rt(0x1146)), 0x90);
        assert!(!d.is_alive());
    }

    #[test]
    fn test_kill() {
        let mut d = debuggee();
        d.kill().unwrap();
        assert!(!d.target().alive);
        assert!(matches!(d.kill(), Err(DebuggerError::ProcessExited)));
    }

    #[test]
    fn test_dump_registers() {
        let d = debuggee();
        let regs = d.dump_registers().unwrap();
        assert_eq!(regs.len(), Register::ALL.len());
        assert!(regs.contains(&(Register::rip, rt(0x1129).u64())));
    }
}
