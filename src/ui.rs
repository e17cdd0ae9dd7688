//! The presentation side of the debugger.

use std::path::Path;

use crate::errors::Result;
use crate::feedback::Feedback;

#[cfg(feature = "cli")]
pub mod cli;

/// Supplies commands to the [`Debugger`](crate::debugger::Debugger) and shows it what happened
pub trait DebuggerUI {
    /// The next command as tokens, [`None`] once there is no more input
    fn next_command(&mut self) -> Result<Option<Vec<String>>>;

    /// Called after every command that changed where the debuggee is stopped
    fn print_current_source_window(&mut self, file: &Path, line: u64, context_lines: usize);

    fn report(&mut self, feedback: &Feedback);
}
