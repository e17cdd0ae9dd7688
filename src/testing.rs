//! Test doubles: a simulated tracee and a fixture program with debug information.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::breakpoint::INT3_BYTE;
use crate::consts::{SI_KERNEL, TRAP_TRACE};
use crate::dbginfo::{
    CompilationUnit, DebugInfo, ElfSymbol, FunctionInfo, LineRow, LineTable, SymbolKind,
    SymbolTable,
};
use crate::errors::{DebuggerError, Result};
use crate::feedback::Feedback;
use crate::memorymap::{MemoryPermissions, MemoryRegion, ProcessMemoryMap};
use crate::target::{RawStop, Target};
use crate::ui::DebuggerUI;
use crate::{Addr, Register, Word, WORD_BYTES};

/// A tiny simulated CPU behind the [`Target`] trait
///
/// Memory is byte addressed and only mapped bytes can be accessed. Execution follows
/// `successors`: the instruction at `pc` is followed by the one at `successors[pc]`. An
/// instruction whose first byte is `0xcc` traps like `int3`, an address in `faults` raises its
/// signal instead of executing, and an instruction without successor ends the process.
#[derive(Debug, Default)]
pub(crate) struct MockTarget {
    pub memory: BTreeMap<usize, u8>,
    pub regs: HashMap<Register, u64>,
    pub successors: HashMap<Addr, Addr>,
    pub faults: HashMap<Addr, (Signal, i32)>,
    pub map: ProcessMemoryMap,
    pub exit_code: i32,
    /// `si_code` reported when an `int3` is executed
    pub trap_code: i32,
    pub fail_writes: bool,
    pub fail_maps: bool,
    /// number of successful word writes
    pub writes: usize,
    pub alive: bool,
    pub detached: bool,
    pending: Option<RawStop>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self {
            alive: true,
            trap_code: SI_KERNEL,
            ..Default::default()
        }
    }

    pub fn with_code(start: usize, bytes: &[u8]) -> Self {
        let mut t = Self::new();
        t.map_bytes(start, bytes);
        t
    }

    pub fn map_bytes(&mut self, start: usize, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(start + i, *b);
        }
    }

    pub fn map_word(&mut self, addr: Addr, value: Word) {
        self.map_bytes(addr.usize(), &value.to_le_bytes());
    }

    pub fn byte(&self, addr: Addr) -> u8 {
        self.memory[&addr.usize()]
    }

    pub fn pc(&self) -> Addr {
        self.regs.get(&Register::rip).copied().unwrap_or(0).into()
    }

    pub fn set_pc(&mut self, addr: Addr) {
        self.regs.insert(Register::rip, addr.u64());
    }

    /// Chains `addrs` so that each one is followed by the next
    pub fn flow(&mut self, addrs: &[Addr]) {
        for w in addrs.windows(2) {
            self.successors.insert(w[0], w[1]);
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            Err(DebuggerError::ProcessAccess(Errno::ESRCH))
        }
    }

    /// Executes the instruction at pc, returns the stop it caused, if any
    fn execute(&mut self) -> Option<RawStop> {
        let pc = self.pc();
        if self.memory.get(&pc.usize()) == Some(&INT3_BYTE) {
            self.set_pc(pc + 1);
            return Some(RawStop::Signal {
                signal: Signal::SIGTRAP,
                code: self.trap_code,
            });
        }
        if let Some((signal, code)) = self.faults.get(&pc) {
            return Some(RawStop::Signal {
                signal: *signal,
                code: *code,
            });
        }
        match self.successors.get(&pc) {
            Some(next) => {
                self.set_pc(*next);
                None
            }
            None => {
                self.alive = false;
                Some(RawStop::Exited(self.exit_code))
            }
        }
    }
}

impl Target for MockTarget {
    fn pid(&self) -> Pid {
        Pid::from_raw(4242)
    }

    fn executable(&self) -> Option<&Path> {
        Some(Path::new("/tmp/prog"))
    }

    fn read_word(&self, addr: Addr) -> Result<Word> {
        if !self.alive {
            return Err(DebuggerError::MemoryAccess {
                addr,
                source: Errno::ESRCH,
            });
        }
        let mut bytes = [0u8; WORD_BYTES];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = *self
                .memory
                .get(&addr.usize().wrapping_add(i))
                .ok_or(DebuggerError::MemoryAccess {
                    addr,
                    source: Errno::EIO,
                })?;
        }
        Ok(Word::from_le_bytes(bytes))
    }

    fn write_word(&mut self, addr: Addr, value: Word) -> Result<()> {
        let mapped = (0..WORD_BYTES)
            .all(|i| self.memory.contains_key(&addr.usize().wrapping_add(i)));
        if !self.alive || self.fail_writes || !mapped {
            return Err(DebuggerError::MemoryAccess {
                addr,
                source: Errno::EIO,
            });
        }
        self.map_word(addr, value);
        self.writes += 1;
        Ok(())
    }

    fn read_register(&self, reg: Register) -> Result<u64> {
        self.check_alive()?;
        Ok(self.regs.get(&reg).copied().unwrap_or(0))
    }

    fn write_register(&mut self, reg: Register, value: u64) -> Result<()> {
        self.check_alive()?;
        self.regs.insert(reg, value);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.check_alive()?;
        for _ in 0..100_000 {
            if let Some(stop) = self.execute() {
                self.pending = Some(stop);
                return Ok(());
            }
        }
        panic!("the simulated program ran away");
    }

    fn step(&mut self) -> Result<()> {
        self.check_alive()?;
        self.pending = Some(self.execute().unwrap_or(RawStop::Signal {
            signal: Signal::SIGTRAP,
            code: TRAP_TRACE,
        }));
        Ok(())
    }

    fn wait(&mut self) -> Result<RawStop> {
        self.pending
            .take()
            .ok_or(DebuggerError::ProcessAccess(Errno::ECHILD))
    }

    fn memory_map(&self) -> Result<ProcessMemoryMap> {
        self.check_alive()?;
        if self.fail_maps {
            return Err(DebuggerError::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )));
        }
        Ok(self.map.clone())
    }

    fn kill(&mut self) -> Result<()> {
        self.check_alive()?;
        self.alive = false;
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        self.check_alive()?;
        self.detached = true;
        Ok(())
    }
}

/// [`DebugInfo`] assembled by hand
#[derive(Debug, Clone, Default)]
pub(crate) struct FixtureDebugInfo {
    pub units: Vec<CompilationUnit>,
    pub symbols: Vec<ElfSymbol>,
    pub position_independent: bool,
}

impl DebugInfo for FixtureDebugInfo {
    fn compilation_units(&self) -> &[CompilationUnit] {
        &self.units
    }

    fn elf_symbols(&self) -> &[ElfSymbol] {
        &self.symbols
    }

    fn is_position_independent(&self) -> bool {
        self.position_independent
    }
}

/// Where the fixture program is loaded
pub(crate) const LOAD: usize = 0x5555_5555_4000;
/// Frame pointer while stopped in `main`
pub(crate) const MAIN_RBP: usize = 0x7ffe_0000;
/// Frame pointer while stopped in `helper`
pub(crate) const HELPER_RBP: usize = 0x7ffd_ffe0;
/// Return address of `main`, somewhere in the C runtime
pub(crate) const MAIN_RET: usize = 0x7fff_f7c2_9d90;
pub(crate) const SOURCE_FILE: &str = "/src/prog/main.c";

/// Static address to runtime address of the fixture program
pub(crate) fn rt(static_addr: usize) -> Addr {
    Addr::from(static_addr + LOAD)
}

fn row(address: usize, line: u64, is_stmt: bool, end_sequence: bool) -> LineRow {
    LineRow {
        address: address.into(),
        file: PathBuf::from(SOURCE_FILE),
        line,
        is_stmt,
        end_sequence,
    }
}

fn sym(table: SymbolTable, kind: SymbolKind, name: &str, addr: usize) -> ElfSymbol {
    ElfSymbol {
        table,
        kind,
        name: name.to_string(),
        addr: addr.into(),
    }
}

/// The debug information of this program:
///
/// ```c
///  3 void helper(void) {
///  4     counter += 1;
///  5 }
///    ...
///  9 int main(void) {
/// 10     counter = 0;
/// 11     helper();
/// 12     counter *= 2;
/// 13     return counter;
/// 14 }
/// ```
pub(crate) fn fixture_debug_info() -> FixtureDebugInfo {
    let rows = vec![
        row(0x1129, 9, true, false),
        row(0x1135, 10, true, false),
        row(0x113c, 11, true, false),
        row(0x1146, 12, true, false),
        row(0x114b, 13, false, false),
        row(0x1150, 13, true, false),
        row(0x115e, 14, true, false),
        row(0x1160, 3, true, false),
        row(0x1168, 4, true, false),
        row(0x1174, 5, true, false),
        row(0x1180, 5, true, true),
    ];
    let unit = CompilationUnit {
        name: SOURCE_FILE.to_string(),
        ranges: vec![Addr::from(0x1129usize)..Addr::from(0x1180usize)],
        functions: vec![
            FunctionInfo {
                name: Some("main".to_string()),
                low: 0x1129usize.into(),
                high: 0x1160usize.into(),
            },
            FunctionInfo {
                name: Some("helper".to_string()),
                low: 0x1160usize.into(),
                high: 0x1180usize.into(),
            },
        ],
        line_table: LineTable::new(rows),
    };

    FixtureDebugInfo {
        units: vec![unit],
        symbols: vec![
            sym(SymbolTable::Symtab, SymbolKind::File, "main.c", 0),
            sym(SymbolTable::Symtab, SymbolKind::Func, "main", 0x1129),
            sym(SymbolTable::Symtab, SymbolKind::Func, "helper", 0x1160),
            sym(SymbolTable::Symtab, SymbolKind::Object, "counter", 0x4010),
            sym(SymbolTable::Dynsym, SymbolKind::Func, "helper", 0x1160),
            sym(SymbolTable::Dynsym, SymbolKind::NoType, "__gmon_start__", 0),
        ],
        position_independent: true,
    }
}

/// A simulated process running the fixture program, stopped at the start of `main`
pub(crate) fn fixture_target() -> MockTarget {
    let mut t = MockTarget::new();

    // code, as nops so that breakpoints have something to replace
    t.map_bytes(LOAD + 0x1000, &[0x90; 0x1000]);
    t.map_bytes(MAIN_RET, &[0x90; 16]);
    // stack
    t.map_bytes(HELPER_RBP - 0x100, &[0; 0x300]);
    t.map_word(Addr::from(MAIN_RBP + 8), MAIN_RET as Word);
    t.map_word(Addr::from(HELPER_RBP + 8), rt(0x1141).into());

    let main_to_call = [0x1129, 0x112d, 0x1131, 0x1135, 0x1139, 0x113c, 0x1160];
    let helper = [0x1160, 0x1164, 0x1168, 0x116c, 0x1174, 0x117f, 0x1141];
    let main_after_call = [0x1141, 0x1146, 0x114b, 0x1150, 0x1155, 0x115e, 0x115f];
    for part in [&main_to_call[..], &helper[..], &main_after_call[..]] {
        let addrs: Vec<Addr> = part.iter().map(|a| rt(*a)).collect();
        t.flow(&addrs);
    }

    t.map = ProcessMemoryMap {
        regions: vec![
            MemoryRegion {
                start_address: LOAD.into(),
                end_address: (LOAD + 0x1000).into(),
                permissions: MemoryPermissions {
                    read: true,
                    private: true,
                    ..Default::default()
                },
                offset: 0,
                path: Some("/tmp/prog".to_string()),
            },
            MemoryRegion {
                start_address: (LOAD + 0x1000).into(),
                end_address: (LOAD + 0x2000).into(),
                permissions: MemoryPermissions {
                    read: true,
                    execute: true,
                    private: true,
                    ..Default::default()
                },
                offset: 0x1000,
                path: Some("/tmp/prog".to_string()),
            },
        ],
    };

    t.set_pc(rt(0x1129));
    t.regs.insert(Register::rbp, MAIN_RBP as u64);
    t
}

/// A [`DebuggerUI`] that plays back commands and records everything it is shown
#[derive(Debug, Default)]
pub(crate) struct RecordingUi {
    pub commands: VecDeque<Vec<String>>,
    pub windows: Vec<(PathBuf, u64, usize)>,
    pub reports: Vec<String>,
}

impl RecordingUi {
    pub fn with_commands(lines: &[&str]) -> Self {
        Self {
            commands: lines
                .iter()
                .map(|l| l.split_whitespace().map(str::to_string).collect())
                .collect(),
            ..Default::default()
        }
    }
}

impl DebuggerUI for RecordingUi {
    fn next_command(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.commands.pop_front())
    }

    fn print_current_source_window(&mut self, file: &Path, line: u64, context_lines: usize) {
        self.windows.push((file.to_owned(), line, context_lines));
    }

    fn report(&mut self, feedback: &Feedback) {
        self.reports.push(feedback.to_string());
    }
}
