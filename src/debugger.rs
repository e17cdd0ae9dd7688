//! # Debugger Module
//!
//! The command engine of the debugger.
//!
//! A [`Debugger`] combines the traced [`Debuggee`], a [`Resolver`] for the debug information of
//! its executable and a [`DebuggerUI`]. It implements the source level operations on top of the
//! instruction level process control of the [`Debuggee`]: breakpoints by function name or source
//! line, stepping by source line, stepping over calls and out of functions.
//!
//! Every operation that moves the debuggee shows the new location through
//! [`DebuggerUI::print_current_source_window`].

use std::fmt::Write as _;

use nix::errno::Errno;
use tracing::{debug, error, info, trace, warn};

use crate::command::{BreakpointSpec, Command};
use crate::consts::RETURN_ADDR_OFFSET;
use crate::dbginfo::{DebugInfo, ElfSymbol};
use crate::debuggee::{Debuggee, StopEvent};
use crate::errors::{DebuggerError, Result};
use crate::expr::ExprContext;
use crate::feedback::Feedback;
use crate::memorymap::ProcessMemoryMap;
use crate::resolver::{LineEntry, Resolver};
use crate::target::Target;
use crate::ui::DebuggerUI;
use crate::{Addr, Register, Word, WORD_BYTES};

/// What to do with a debuggee that is still alive when the debugger shuts down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    #[default]
    Kill,
    /// Remove all breakpoints and let the debuggee run on
    Detach,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig {
    /// Lines of source shown above and below the current line
    pub context_lines: usize,
    pub on_exit: ShutdownPolicy,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            context_lines: 2,
            on_exit: ShutdownPolicy::default(),
        }
    }
}

pub struct Debugger<T: Target, D: DebugInfo, UI: DebuggerUI> {
    debuggee: Debuggee<T>,
    resolver: Resolver<D>,
    ui: UI,
    config: DebuggerConfig,
}

impl<T: Target, D: DebugInfo, UI: DebuggerUI> Debugger<T, D, UI> {
    /// Starts a session for a stopped `target` whose executable is described by `info`
    ///
    /// For a position independent executable the load address is taken from the memory map of
    /// the target. If that fails, the target is killed or detached according to
    /// [`DebuggerConfig::on_exit`] before the error is returned.
    pub fn attach(mut target: T, info: D, ui: UI, config: DebuggerConfig) -> Result<Self> {
        let load_address = if info.is_position_independent() {
            let map = match target.memory_map() {
                Ok(map) => map,
                Err(e) => {
                    error!("could not read the memory map of the debuggee: {e}");
                    Self::release(&mut target, config.on_exit);
                    return Err(e);
                }
            };
            match map.load_address(target.executable()) {
                Some(addr) => addr,
                None => {
                    warn!("the memory map of the debuggee is empty, assuming it is not relocated");
                    Addr::NULL
                }
            }
        } else {
            Addr::NULL
        };
        info!(
            "attached to process {}, load address is {load_address}",
            target.pid()
        );

        Ok(Debugger {
            debuggee: Debuggee::new(target),
            resolver: Resolver::new(info, load_address),
            ui,
            config,
        })
    }

    /// Lets go of a target that never became a session
    fn release(target: &mut T, policy: ShutdownPolicy) {
        let res = match policy {
            ShutdownPolicy::Kill => target.kill(),
            ShutdownPolicy::Detach => target.detach(),
        };
        if let Err(e) = res {
            warn!("could not release the debuggee: {e}");
        }
    }

    pub fn debuggee(&self) -> &Debuggee<T> {
        &self.debuggee
    }

    pub fn resolver(&self) -> &Resolver<D> {
        &self.resolver
    }

    pub fn ui(&self) -> &UI {
        &self.ui
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Reads commands from the UI and executes them until `quit` or the end of input
    pub fn run_debugger(&mut self) -> Result<()> {
        while let Some(tokens) = self.ui.next_command()? {
            let command = match Command::parse(&tokens) {
                Ok(Command::Quit) => break,
                Ok(command) => command,
                Err(e) => {
                    self.ui.report(&Feedback::Error(e));
                    continue;
                }
            };
            let feedback: Feedback = self.execute(command).into();
            self.ui.report(&feedback);
        }
        info!("leaving the command loop");
        Ok(())
    }

    /// Parses and executes one command line, errors are returned as [`Feedback::Error`]
    pub fn handle_command<S: AsRef<str>>(&mut self, tokens: &[S]) -> Feedback {
        Command::parse(tokens)
            .and_then(|command| self.execute(command))
            .into()
    }

    pub fn execute(&mut self, command: Command) -> Result<Feedback> {
        trace!("executing {command:?}");
        Ok(match command {
            Command::Continue => Feedback::Stopped(self.continue_execution()?),
            Command::SetBreakpoint(spec) => Feedback::BreakpointSet(self.set_breakpoint(spec)?),
            Command::DelBreakpoint(addr) => {
                self.remove_breakpoint(addr)?;
                Feedback::Ok
            }
            Command::DumpRegisters => Feedback::Registers(self.debuggee.dump_registers()?),
            Command::ReadRegister(reg) => Feedback::Word(self.debuggee.get_reg(reg)? as Word),
            Command::WriteRegister(reg, value) => {
                self.write_register(reg, value)?;
                Feedback::Ok
            }
            Command::ReadMemory(addr, size) => Feedback::Word(self.read_memory(addr, size)?),
            Command::WriteMemory(addr, value) => {
                self.write_memory(addr, value)?;
                Feedback::Ok
            }
            Command::StepInto => Feedback::Stopped(self.step_in()?),
            Command::StepSingle => Feedback::Stopped(self.stepi()?),
            Command::StepOver => Feedback::Stopped(self.step_over()?),
            Command::StepOut => Feedback::Stopped(self.step_out()?),
            Command::GetSymbolsByName(name) => Feedback::Symbols(self.symbols(&name)),
            Command::Info => Feedback::Text(self.info()?),
            Command::ProcMap => Feedback::Text(self.maps()?.to_string()),
            Command::Kill => {
                self.kill()?;
                Feedback::Ok
            }
            Command::Quit => Feedback::Ok,
        })
    }

    /// Runs the debuggee until the next breakpoint, signal or exit
    pub fn continue_execution(&mut self) -> Result<StopEvent> {
        let event = self.debuggee.continue_execution()?;
        self.present_location()?;
        Ok(event)
    }

    /// Executes one machine instruction
    pub fn stepi(&mut self) -> Result<StopEvent> {
        let event = self.debuggee.single_instruction_step_checked()?;
        self.present_location()?;
        Ok(event)
    }

    /// Steps instructions until the debuggee is on a different source line
    ///
    /// Instructions without line information are stepped through, so stepping into a function
    /// without debug information continues until it returns to known code. Any stop other than
    /// a finished single step ends the operation early.
    pub fn step_in(&mut self) -> Result<StopEvent> {
        let start = self.current_line()?.map(|e| e.location);
        debug!("step in from {start:?}");

        loop {
            let event = self.debuggee.single_instruction_step_checked()?;
            if event != StopEvent::SteppedOk {
                self.present_location()?;
                return Ok(event);
            }
            if let Some(here) = self.current_line()? {
                if start.as_ref() != Some(&here.location) {
                    break;
                }
            }
        }

        self.present_location()?;
        Ok(StopEvent::SteppedOk)
    }

    /// Runs to the next line of the current function, or to the caller if it returns first
    ///
    /// A temporary breakpoint is placed on every line table row of the function except the
    /// current one, and on the return address. This sets as many breakpoints as the function has
    /// rows. Only the breakpoints added here are removed afterwards, also when continuing fails.
    pub fn step_over(&mut self) -> Result<StopEvent> {
        let pc = self.debuggee.get_pc()?;
        let static_pc = self.resolver.offset_to_static(pc);

        let mut stops: Vec<Addr> = {
            let func = self.resolver.function_containing(static_pc)?;
            let start = self.resolver.line_entry_for(static_pc)?;
            self.resolver
                .function_lines(func)?
                .into_iter()
                .filter(|e| e.address != start.address)
                .map(|e| self.resolver.offset_to_runtime(e.address))
                .collect()
        };
        stops.push(self.return_address()?);
        debug!("step over from {pc}, {} candidate stops", stops.len());

        self.run_with_temporary_breakpoints(&stops)
    }

    /// Runs until the current function returns to its caller
    pub fn step_out(&mut self) -> Result<StopEvent> {
        let return_address = self.return_address()?;
        debug!("step out to {return_address}");
        self.run_with_temporary_breakpoints(&[return_address])
    }

    fn run_with_temporary_breakpoints(&mut self, stops: &[Addr]) -> Result<StopEvent> {
        let mut temporary = Vec::new();
        let mut run = || -> Result<StopEvent> {
            for addr in stops {
                if !self.debuggee.breakpoints().contains(*addr)
                    && self.debuggee.set_breakpoint(*addr)?
                {
                    temporary.push(*addr);
                }
            }
            self.debuggee.continue_execution()
        };
        let result = run();

        let removed = self.remove_temporary_breakpoints(&temporary);
        let event = result?;
        removed?;

        self.present_location()?;
        Ok(match event {
            StopEvent::HitBreakpoint(addr) if temporary.contains(&addr) => StopEvent::SteppedOk,
            other => other,
        })
    }

    fn remove_temporary_breakpoints(&mut self, temporary: &[Addr]) -> Result<()> {
        if !self.debuggee.is_alive() {
            // nothing left to restore
            return Ok(());
        }
        for addr in temporary {
            self.debuggee.remove_breakpoint(*addr)?;
        }
        trace!("removed {} temporary breakpoints", temporary.len());
        Ok(())
    }

    /// Installs a breakpoint, returns its runtime address
    ///
    /// Numeric addresses are used as given. Setting a breakpoint where one already exists
    /// changes nothing.
    pub fn set_breakpoint(&mut self, spec: BreakpointSpec) -> Result<Addr> {
        let addr = match spec {
            BreakpointSpec::Address(addr) => addr,
            BreakpointSpec::Line { file, line } => self.resolver.address_for_line(file, line)?,
            BreakpointSpec::Function(name) => self.resolver.address_for_function(&name)?,
        };
        self.debuggee.set_breakpoint(addr)?;
        Ok(addr)
    }

    pub fn remove_breakpoint(&mut self, addr: Addr) -> Result<()> {
        self.debuggee.remove_breakpoint(addr)
    }

    /// Reads a word, or `size` bytes of it, at `addr`
    pub fn read_memory(&self, addr: Addr, size: Option<usize>) -> Result<Word> {
        match size {
            None => self.debuggee.read_memory(addr),
            Some(size) => Ok(self.debuggee.deref_size(addr, size)? as Word),
        }
    }

    pub fn write_memory(&mut self, addr: Addr, value: Word) -> Result<()> {
        self.debuggee.write_memory(addr, value)
    }

    pub fn write_register(&mut self, reg: Register, value: u64) -> Result<()> {
        self.debuggee.set_reg(reg, value)?;
        if reg == Register::rip {
            self.present_location()?;
        }
        Ok(())
    }

    pub fn symbols(&self, name: &str) -> Vec<ElfSymbol> {
        self.resolver.symbols_named(name)
    }

    pub fn maps(&self) -> Result<ProcessMemoryMap> {
        self.debuggee.ensure_alive()?;
        self.debuggee.target().memory_map()
    }

    pub fn kill(&mut self) -> Result<()> {
        self.debuggee.kill()
    }

    /// The return address of the current frame, found above the saved frame pointer
    ///
    /// Only valid after the prologue of the current function has set up the frame pointer. Code
    /// without frame pointers can leave any value in `rbp`, a slot outside the address space is a
    /// [`DebuggerError::MemoryAccess`].
    pub fn return_address(&self) -> Result<Addr> {
        let frame_pointer = Addr::from(self.debuggee.reg(gimli::X86_64::RBP)?);
        let slot = frame_pointer.checked_add(RETURN_ADDR_OFFSET).ok_or(
            DebuggerError::MemoryAccess {
                addr: frame_pointer,
                source: Errno::EFAULT,
            },
        )?;
        let addr = self.debuggee.deref_size(slot, WORD_BYTES)?;
        trace!("return address of the frame at {frame_pointer}: {addr:#x}");
        Ok(addr.into())
    }

    /// A summary of the session: process, load address, location and breakpoints
    pub fn info(&self) -> Result<String> {
        let mut buf = String::new();
        let target = self.debuggee.target();
        let exe = target
            .executable()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        // writing to a String cannot fail
        let _ = writeln!(buf, "process:      {} ({exe})", target.pid());
        let _ = writeln!(buf, "state:        {:?}", self.debuggee.state());
        let _ = writeln!(buf, "load address: {}", self.resolver.load_address());

        if self.debuggee.is_alive() {
            let pc = self.debuggee.get_pc()?;
            let _ = write!(buf, "pc:           {pc}");
            match self.current_line()? {
                Some(entry) => {
                    let _ = write!(buf, " at {}", entry.location);
                }
                None => {
                    if let Some(path) = self
                        .maps()?
                        .region_of(pc)
                        .and_then(|region| region.path.clone())
                    {
                        let _ = write!(buf, " in {path}");
                    }
                }
            }
            let _ = writeln!(buf);
        }

        let mut breakpoints: Vec<_> = self.debuggee.breakpoints().iter().collect();
        breakpoints.sort_by_key(|bp| bp.addr());
        let _ = write!(buf, "breakpoints:  {}", breakpoints.len());
        for bp in breakpoints {
            let state = if bp.is_enabled() { "enabled" } else { "disabled" };
            let _ = write!(buf, "\n  {} {state}", bp.addr());
        }
        Ok(buf)
    }

    /// Applies the [`ShutdownPolicy`] to a debuggee that is still alive
    pub fn cleanup(&mut self) -> Result<()> {
        if !self.debuggee.is_alive() {
            return Ok(());
        }
        match self.config.on_exit {
            ShutdownPolicy::Kill => self.debuggee.kill(),
            ShutdownPolicy::Detach => {
                info!("detaching from the debuggee");
                self.debuggee.detach()
            }
        }
    }

    /// The line table row for the current program counter, if there is one
    fn current_line(&self) -> Result<Option<LineEntry>> {
        let pc = self.debuggee.get_pc()?;
        Ok(self
            .resolver
            .line_entry_for(self.resolver.offset_to_static(pc))
            .ok())
    }

    fn present_location(&mut self) -> Result<()> {
        if !self.debuggee.is_alive() {
            return Ok(());
        }
        match self.current_line()? {
            Some(entry) => self.ui.print_current_source_window(
                &entry.location.file,
                entry.location.line,
                self.config.context_lines,
            ),
            None => debug!("no source information for the current location"),
        }
        Ok(())
    }
}
