use std::io::ErrorKind;
use std::path::Path;

use dialoguer::{BasicHistory, Input};
use tracing::warn;

use super::DebuggerUI;
use crate::errors::Result;
use crate::feedback::Feedback;
use crate::source::SourceWindow;

const PROMPT: &str = "ptdbg";
const HISTORY_SIZE: usize = 200;

/// Interactive command line with history
pub struct CliUi {
    history: BasicHistory,
}

impl CliUi {
    pub fn build() -> Result<Self> {
        Ok(CliUi {
            history: BasicHistory::new()
                .max_entries(HISTORY_SIZE)
                .no_duplicates(true),
        })
    }

    fn get_line(&mut self) -> Result<Option<String>> {
        let line: std::result::Result<String, dialoguer::Error> = Input::new()
            .with_prompt(PROMPT)
            .allow_empty(true)
            .history_with(&mut self.history)
            .interact_text();

        match line {
            Ok(line) => Ok(Some(line)),
            Err(dialoguer::Error::IO(e))
                if matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::Interrupted) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl DebuggerUI for CliUi {
    fn next_command(&mut self) -> Result<Option<Vec<String>>> {
        loop {
            let Some(line) = self.get_line()? else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match shlex::split(line) {
                Some(tokens) => return Ok(Some(tokens)),
                None => warn!("could not split the input, check the quoting"),
            }
        }
    }

    fn print_current_source_window(&mut self, file: &Path, line: u64, context_lines: usize) {
        match SourceWindow::load(file, line, context_lines) {
            Ok(window) => print!("{window}"),
            Err(e) => warn!("could not show {}:{line}: {e}", file.display()),
        }
    }

    fn report(&mut self, feedback: &Feedback) {
        match feedback {
            Feedback::Ok => (),
            Feedback::Error(e) => eprintln!("{e}"),
            other => println!("{other}"),
        }
    }
}
