//! Constants for signal classification and the x86_64 frame layout.
//!
//! The `si_code` values are buried in the kernel headers and not exported by nix or the libc
//! bindings, so they are written down here.
//!
//! Source: <https://elixir.bootlin.com/linux/v6.13.1/source/include/uapi/asm-generic/siginfo.h#L227>

/// Sent by the kernel from somewhere
pub const SI_KERNEL: i32 = 0x80;

// ---------------- SIGTRAP si_codes ---------------------------------------------------------------

/// Process breakpoint
pub const TRAP_BRKPT: i32 = 0x1;
/// Process trace trap
pub const TRAP_TRACE: i32 = 0x2;

// ---------------- SIGSEGV si_codes ---------------------------------------------------------------

/// Address not mapped to object
pub const SEGV_MAPERR: i32 = 0x1;

// ---------------- frame layout -------------------------------------------------------------------

/// The return address sits right above the saved frame pointer
pub const RETURN_ADDR_OFFSET: usize = 8;
