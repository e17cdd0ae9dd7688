//! # Debug-Info Resolver
//!
//! Answers source level questions about addresses and names on top of a [`DebugInfo`].
//!
//! DWARF and the ELF symbol tables describe *static* addresses, the addresses the program was
//! linked at. A position independent executable is moved by the loader, so the addresses the
//! running process uses are shifted by the load address. All queries of the [`Resolver`] take
//! and give static addresses, except [`Resolver::address_for_function`] and
//! [`Resolver::address_for_line`], which produce addresses for breakpoints and therefore return
//! runtime addresses. Use [`Resolver::offset_to_static`] and [`Resolver::offset_to_runtime`] to
//! convert, exactly once per call site.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::dbginfo::{CompilationUnit, DebugInfo, ElfSymbol, FunctionInfo};
use crate::errors::{DebuggerError, Result};
use crate::Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u64,
}

/// A row of a line table, as found by the [`Resolver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    pub location: SourceLocation,
    pub is_stmt: bool,
    /// static address of the first instruction of the row
    pub address: Addr,
}

#[derive(Debug, Clone)]
pub struct Resolver<D: DebugInfo> {
    info: D,
    load_address: Addr,
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

impl<D: DebugInfo> Resolver<D> {
    /// `load_address` is [`Addr::NULL`] for executables that are not relocated
    pub fn new(info: D, load_address: Addr) -> Self {
        Self { info, load_address }
    }

    pub fn info(&self) -> &D {
        &self.info
    }

    pub fn load_address(&self) -> Addr {
        self.load_address
    }

    /// Runtime address to static address
    #[inline]
    pub fn offset_to_static(&self, runtime: Addr) -> Addr {
        runtime.wrapping_sub(self.load_address)
    }

    /// Static address to runtime address
    #[inline]
    pub fn offset_to_runtime(&self, static_addr: Addr) -> Addr {
        static_addr.wrapping_add(self.load_address)
    }

    fn units_containing(&self, addr: Addr) -> impl Iterator<Item = &CompilationUnit> {
        self.info
            .compilation_units()
            .iter()
            .filter(move |cu| cu.contains(addr))
    }

    /// The function whose code contains the static address `addr`
    pub fn function_containing(&self, addr: Addr) -> Result<&FunctionInfo> {
        trace!("get function for addr {addr}");
        self.units_containing(addr)
            .flat_map(|cu| cu.functions.iter())
            .find(|f| f.contains(addr))
            .ok_or_else(|| DebuggerError::SymbolNotFound(format!("function containing {addr}")))
    }

    /// The line table row describing the code at the static address `addr`
    pub fn line_entry_for(&self, addr: Addr) -> Result<LineEntry> {
        for cu in self.units_containing(addr) {
            let table = &cu.line_table;
            if let Some(row) = table.find_address(addr).and_then(|idx| table.get(idx)) {
                trace!("line entry for {addr}: {}:{}", row.file.display(), row.line);
                return Ok(LineEntry {
                    location: SourceLocation {
                        file: row.file.clone(),
                        line: row.line,
                    },
                    is_stmt: row.is_stmt,
                    address: row.address,
                });
            }
        }
        Err(DebuggerError::SymbolNotFound(format!("line entry for {addr}")))
    }

    /// Every line table row inside `func`, starting with the row at its low address
    pub fn function_lines(&self, func: &FunctionInfo) -> Result<Vec<LineEntry>> {
        let not_found = || {
            DebuggerError::SymbolNotFound(format!(
                "line entries of {}",
                func.name.as_deref().unwrap_or("<anonymous>")
            ))
        };
        let cu = self.units_containing(func.low).next().ok_or_else(not_found)?;
        let first = cu.line_table.find_address(func.low).ok_or_else(not_found)?;

        Ok(cu.line_table.rows()[first..]
            .iter()
            .take_while(|row| !row.end_sequence && row.address < func.high)
            .map(|row| LineEntry {
                location: SourceLocation {
                    file: row.file.clone(),
                    line: row.line,
                },
                is_stmt: row.is_stmt,
                address: row.address,
            })
            .collect())
    }

    /// Runtime address of the first line of user code in the function `name`
    ///
    /// The low address of a function points at its prologue. This takes the line table row after
    /// the one at the low address, assuming that the prologue makes up exactly the first row.
    /// That holds for unoptimized code, but may place the breakpoint too late for functions with
    /// an unusual prologue.
    pub fn address_for_function(&self, name: &str) -> Result<Addr> {
        for cu in self.info.compilation_units() {
            for func in cu
                .functions
                .iter()
                .filter(|f| f.name.as_deref() == Some(name))
            {
                let table = &cu.line_table;
                let Some(idx) = table.find_address(func.low) else {
                    debug!("function {name} at {} has no line entry", func.low);
                    continue;
                };
                let addr = match table.get(idx + 1) {
                    Some(next) if !next.end_sequence => next.address,
                    _ => func.low,
                };
                debug!("function {name} at {}, user code at {addr}", func.low);
                return Ok(self.offset_to_runtime(addr));
            }
        }
        Err(DebuggerError::SymbolNotFound(format!("function {name}")))
    }

    /// Runtime address of the first statement of `line` in the source file `file`
    ///
    /// `file` may be a suffix of the path the compiler recorded, `main.c` finds `src/main.c`.
    pub fn address_for_line(&self, file: impl AsRef<Path>, line: u64) -> Result<Addr> {
        let file = file.as_ref();
        for cu in self
            .info
            .compilation_units()
            .iter()
            .filter(|cu| cu.is_named(file))
        {
            if let Some(row) = cu
                .line_table
                .rows()
                .iter()
                .find(|row| row.is_stmt && !row.end_sequence && row.line == line)
            {
                debug!("{}:{line} is at {}", file.display(), row.address);
                return Ok(self.offset_to_runtime(row.address));
            }
        }
        Err(DebuggerError::SymbolNotFound(format!("{}:{line}", file.display())))
    }

    /// All ELF symbols called exactly `name`, from both the static and the dynamic symbol table
    pub fn symbols_named(&self, name: &str) -> Vec<ElfSymbol> {
        self.info
            .elf_symbols()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }
}
