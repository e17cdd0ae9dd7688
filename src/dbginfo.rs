//! # Debug Information
//!
//! The query model the resolver works on: compilation units with their address ranges,
//! functions and line tables, plus the raw ELF symbol tables.
//!
//! [`DebugInfo`] is the capability the rest of the debugger consumes. [`ElfDebugInfo`] fills it
//! from an ELF executable using [`object`] for sections and symbols and [`gimli`] for the DWARF
//! units, DIEs and line programs. Every address in here is a *static* address, as written in the
//! executable.

use std::fmt::Display;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use gimli::{
    AttributeValue, DW_AT_high_pc, DW_AT_low_pc, DW_AT_name, DW_TAG_subprogram, EndianRcSlice,
    Reader, RunTimeEndian, Unit,
};
use object::{Object, ObjectKind, ObjectSection, ObjectSymbol};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::Addr;

// the gimli::Reader we use
type GimliRd = EndianRcSlice<RunTimeEndian>;

/// Read-only access to already parsed debug information
pub trait DebugInfo {
    fn compilation_units(&self) -> &[CompilationUnit];

    /// Entries of the `.symtab` and `.dynsym` sections
    fn elf_symbols(&self) -> &[ElfSymbol];

    /// `true` for `ET_DYN` executables, which the loader relocates
    fn is_position_independent(&self) -> bool;
}

/// One row of a DWARF line table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRow {
    pub address: Addr,
    pub file: PathBuf,
    pub line: u64,
    pub is_stmt: bool,
    /// Marks the first address after a sequence, this row describes no code
    pub end_sequence: bool,
}

/// The line table of a compilation unit, rows in program order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    rows: Vec<LineRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: Option<String>,
    pub low: Addr,
    /// exclusive
    pub high: Addr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationUnit {
    /// `DW_AT_name` of the unit root, usually the path of the main source file
    pub name: String,
    pub ranges: Vec<Range<Addr>>,
    pub functions: Vec<FunctionInfo>,
    pub line_table: LineTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    NoType,
    Object,
    Func,
    Section,
    File,
    Tls,
    Unknown,
}

/// Which section a symbol came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolTable {
    Symtab,
    Dynsym,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElfSymbol {
    pub table: SymbolTable,
    pub kind: SymbolKind,
    pub name: String,
    pub addr: Addr,
}

impl LineTable {
    pub fn new(rows: Vec<LineRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[LineRow] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&LineRow> {
        self.rows.get(index)
    }

    /// Index of the row describing the code at `addr`
    ///
    /// That is the row `r` with `r.address <= addr < next.address`, where `next` is the row
    /// after `r` in the same sequence.
    pub fn find_address(&self, addr: Addr) -> Option<usize> {
        self.rows
            .windows(2)
            .position(|w| !w[0].end_sequence && w[0].address <= addr && addr < w[1].address)
    }
}

impl FunctionInfo {
    #[inline]
    pub fn contains(&self, addr: Addr) -> bool {
        self.low <= addr && addr < self.high
    }
}

impl CompilationUnit {
    pub fn contains(&self, addr: Addr) -> bool {
        self.ranges.iter().any(|r| r.contains(&addr))
    }

    /// `true` if `file` names the unit's source file, `main.c` matches `/src/app/main.c`
    pub fn is_named(&self, file: impl AsRef<Path>) -> bool {
        Path::new(&self.name).ends_with(file)
    }
}

impl Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SymbolKind::NoType => "notype",
            SymbolKind::Object => "object",
            SymbolKind::Func => "func",
            SymbolKind::Section => "section",
            SymbolKind::File => "file",
            SymbolKind::Tls => "tls",
            SymbolKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl From<object::SymbolKind> for SymbolKind {
    fn from(value: object::SymbolKind) -> Self {
        match value {
            object::SymbolKind::Text => SymbolKind::Func,
            object::SymbolKind::Data => SymbolKind::Object,
            object::SymbolKind::Section => SymbolKind::Section,
            object::SymbolKind::File => SymbolKind::File,
            object::SymbolKind::Tls => SymbolKind::Tls,
            object::SymbolKind::Unknown => SymbolKind::NoType,
            _ => SymbolKind::Unknown,
        }
    }
}

/// [`DebugInfo`] read from an ELF executable
#[derive(Debug, Clone, Default)]
pub struct ElfDebugInfo {
    units: Vec<CompilationUnit>,
    symbols: Vec<ElfSymbol>,
    position_independent: bool,
}

impl ElfDebugInfo {
    /// Reads the symbol tables and the DWARF units of `object_info`
    ///
    /// # Errors
    ///
    /// Fails if the DWARF sections are malformed.
    pub fn build(object_info: &object::File<'_>) -> Result<Self> {
        let endian = if object_info.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let loader = |section: gimli::SectionId| -> std::result::Result<GimliRd, gimli::Error> {
            let data = object_info
                .section_by_name(section.name())
                .and_then(|s| s.uncompressed_data().ok())
                .unwrap_or_default();
            Ok(GimliRd::new(Rc::from(data.as_ref()), endian))
        };
        let dwarf = gimli::Dwarf::load(loader)?;

        let mut units = Vec::new();
        let mut iter = dwarf.units();
        while let Some(header) = iter.next()? {
            let unit = dwarf.unit(header)?;
            units.push(Self::read_unit(&dwarf, &unit)?);
        }

        let mut symbols = Vec::new();
        for sym in object_info.symbols() {
            if let Some(s) = Self::read_symbol(&sym, SymbolTable::Symtab) {
                symbols.push(s);
            }
        }
        for sym in object_info.dynamic_symbols() {
            if let Some(s) = Self::read_symbol(&sym, SymbolTable::Dynsym) {
                symbols.push(s);
            }
        }

        let position_independent = object_info.kind() == ObjectKind::Dynamic;
        info!(
            "loaded {} compilation units and {} symbols (position independent: {position_independent})",
            units.len(),
            symbols.len()
        );

        Ok(Self {
            units,
            symbols,
            position_independent,
        })
    }

    /// Reads and parses the executable at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let object_info = object::File::parse(&*raw)?;
        Self::build(&object_info)
    }

    fn read_symbol<'data, S: ObjectSymbol<'data>>(
        sym: &S,
        table: SymbolTable,
    ) -> Option<ElfSymbol> {
        let name = sym.name().ok()?;
        if name.is_empty() {
            return None;
        }
        Some(ElfSymbol {
            table,
            kind: sym.kind().into(),
            name: name.to_string(),
            addr: sym.address().into(),
        })
    }

    fn read_unit(dwarf: &gimli::Dwarf<GimliRd>, unit: &Unit<GimliRd>) -> Result<CompilationUnit> {
        let mut ranges = Vec::new();
        let mut range_iter = dwarf.unit_ranges(unit)?;
        while let Some(r) = range_iter.next()? {
            ranges.push(Addr::from(r.begin)..Addr::from(r.end));
        }

        let mut name = String::new();
        let mut functions = Vec::new();
        let mut entries = unit.entries();
        let mut is_root = true;
        while let Some((_, entry)) = entries.next_dfs()? {
            if is_root {
                is_root = false;
                if let Some(n) = Self::parse_string(dwarf, unit, entry.attr_value(DW_AT_name)?)? {
                    name = n;
                }
                continue;
            }
            if entry.tag() != DW_TAG_subprogram {
                continue;
            }
            let low = match entry.attr_value(DW_AT_low_pc)? {
                Some(v) => dwarf.attr_address(unit, v)?,
                None => None,
            };
            // declarations and inlined-only functions have no code of their own
            let Some(low) = low else { continue };
            let high = match entry.attr_value(DW_AT_high_pc)? {
                Some(AttributeValue::Addr(a)) => a,
                Some(other) => match other.udata_value() {
                    Some(len) => low + len,
                    None => {
                        warn!("could not parse high pc: {other:?}");
                        continue;
                    }
                },
                None => continue,
            };
            functions.push(FunctionInfo {
                name: Self::parse_string(dwarf, unit, entry.attr_value(DW_AT_name)?)?,
                low: low.into(),
                high: high.into(),
            });
        }

        let line_table = Self::read_line_table(dwarf, unit)?;
        debug!(
            "unit {name}: {} ranges, {} functions, {} line rows",
            ranges.len(),
            functions.len(),
            line_table.rows().len()
        );

        Ok(CompilationUnit {
            name,
            ranges,
            functions,
            line_table,
        })
    }

    fn read_line_table(dwarf: &gimli::Dwarf<GimliRd>, unit: &Unit<GimliRd>) -> Result<LineTable> {
        let Some(program) = unit.line_program.clone() else {
            return Ok(LineTable::default());
        };
        let comp_dir = match &unit.comp_dir {
            Some(d) => PathBuf::from(d.to_string_lossy()?.as_ref()),
            None => PathBuf::new(),
        };

        let mut rows = Vec::new();
        let mut iter = program.rows();
        while let Some((header, row)) = iter.next_row()? {
            let mut file = comp_dir.clone();
            if let Some(entry) = row.file(header) {
                if let Some(dir) = entry.directory(header) {
                    if let Some(d) = Self::parse_string(dwarf, unit, Some(dir))? {
                        file.push(d);
                    }
                }
                if let Some(n) = Self::parse_string(dwarf, unit, Some(entry.path_name()))? {
                    file.push(n);
                }
            }
            rows.push(LineRow {
                address: row.address().into(),
                file,
                line: row.line().map(|l| l.get()).unwrap_or(0),
                is_stmt: row.is_stmt(),
                end_sequence: row.end_sequence(),
            });
        }

        Ok(LineTable::new(rows))
    }

    fn parse_string(
        dwarf: &gimli::Dwarf<GimliRd>,
        unit: &Unit<GimliRd>,
        value: Option<AttributeValue<GimliRd>>,
    ) -> Result<Option<String>> {
        Ok(match value {
            Some(v) => Some(
                dwarf
                    .attr_string(unit, v)?
                    .to_string_lossy()?
                    .to_string(),
            ),
            None => None,
        })
    }
}

impl DebugInfo for ElfDebugInfo {
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
