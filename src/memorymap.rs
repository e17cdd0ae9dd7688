//! # Memory Map Module
//!
//! The layout of the debuggee's virtual address space as read from `/proc/<pid>/maps` with the
//! [`proc_maps`] crate.
//!
//! The debugger needs it for a single thing at start-up: the load address of a position
//! independent executable, which is the start of the first mapping of the executable file.

use std::fmt::{self, Display};
use std::path::Path;

use crate::addr::Addr;

/// A single line of `/proc/<pid>/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start_address: Addr,
    /// exclusive
    pub end_address: Addr,
    pub permissions: MemoryPermissions,
    /// Offset within the mapped file
    pub offset: usize,
    /// Path of the mapped file, [`None`] for anonymous mappings
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryPermissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessMemoryMap {
    pub regions: Vec<MemoryRegion>,
}

impl MemoryRegion {
    pub fn size(&self) -> usize {
        self.end_address.usize() - self.start_address.usize()
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.start_address <= addr && addr < self.end_address
    }
}

impl ProcessMemoryMap {
    /// The address at which the loader placed the executable
    ///
    /// This is the start of the first region backed by `executable`. If the executable is not
    /// known or not found, the first region of the whole map is used, which is where the kernel
    /// puts the executable when address space layout randomization is disabled.
    pub fn load_address(&self, executable: Option<&Path>) -> Option<Addr> {
        let by_path = executable.and_then(|exe| {
            self.regions
                .iter()
                .find(|r| r.path.as_deref().is_some_and(|p| Path::new(p) == exe))
        });
        by_path.or(self.regions.first()).map(|r| r.start_address)
    }

    pub fn region_of(&self, addr: Addr) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.contains(addr))
    }
}

impl From<Vec<proc_maps::MapRange>> for ProcessMemoryMap {
    fn from(ranges: Vec<proc_maps::MapRange>) -> Self {
        let regions = ranges
            .iter()
            .map(|range| {
                let start = range.start();
                // 4th char is 'p' for private and 's' for shared
                let private = range.flags.len() >= 4 && &range.flags[3..4] == "p";

                MemoryRegion {
                    start_address: Addr::from(start),
                    end_address: Addr::from(start + range.size()),
                    permissions: MemoryPermissions {
                        read: range.is_read(),
                        write: range.is_write(),
                        execute: range.is_exec(),
                        private,
                    },
                    offset: range.offset,
                    path: range.filename().map(|p| p.to_string_lossy().to_string()),
                }
            })
            .collect();

        ProcessMemoryMap { regions }
    }
}

impl Display for MemoryPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.read { "r" } else { "-" },
            if self.write { "w" } else { "-" },
            if self.execute { "x" } else { "-" },
            if self.private { "p" } else { "s" },
        )
    }
}

impl Display for ProcessMemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for region in &self.regions {
            writeln!(
                f,
                "{:016x}-{:016x} {} {:08x} {}",
                region.start_address,
                region.end_address,
                region.permissions,
                region.offset,
                region.path.as_deref().unwrap_or("[anonymous]")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn region(start: usize, end: usize, path: Option<&str>) -> MemoryRegion {
        MemoryRegion {
            start_address: start.into(),
            end_address: end.into(),
            permissions: MemoryPermissions {
                read: true,
                execute: true,
                private: true,
                ..Default::default()
            },
            offset: 0,
            path: path.map(str::to_string),
        }
    }

    #[test]
    fn test_load_address_prefers_executable() {
        let map = ProcessMemoryMap {
            regions: vec![
                region(0x1000, 0x2000, None),
                region(0x5555_5555_4000, 0x5555_5555_5000, Some("/tmp/prog")),
                region(0x5555_5555_5000, 0x5555_5555_6000, Some("/tmp/prog")),
            ],
        };
        assert_eq!(
            map.load_address(Some(Path::new("/tmp/prog"))),
            Some(Addr::from(0x5555_5555_4000usize))
        );
        assert_eq!(
            map.load_address(Some(Path::new("/tmp/other"))),
            Some(Addr::from(0x1000usize))
        );
        assert_eq!(ProcessMemoryMap::default().load_address(None), None);
    }

    #[test]
    fn test_region_lookup() {
        let map = ProcessMemoryMap {
            regions: vec![region(0x1000, 0x2000, Some("/tmp/prog"))],
        };
        assert_eq!(map.regions[0].size(), 0x1000);
        assert!(map.region_of(Addr::from(0x1fffusize)).is_some());
        assert!(map.region_of(Addr::from(0x2000usize)).is_none());
        assert!(map.to_string().contains("r-xp"));
    }
}
