//! A few lines of source code around the current position.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceWindow {
    pub file: PathBuf,
    pub current: u64,
    /// line number and text, in order
    pub lines: Vec<(u64, String)>,
}

impl SourceWindow {
    /// Reads the window around `line` from `file`
    pub fn load(file: impl AsRef<Path>, line: u64, context_lines: usize) -> Result<Self> {
        let file = file.as_ref();
        let text = std::fs::read_to_string(file)?;
        Ok(Self::from_source(file, &text, line, context_lines))
    }

    /// Takes `2 * context_lines + 1` lines centered on `line`. Near the top of the file the
    /// window is moved down so it keeps its size.
    pub fn from_source(
        file: impl AsRef<Path>,
        text: &str,
        line: u64,
        context_lines: usize,
    ) -> Self {
        let context = context_lines as u64;
        let start = line.saturating_sub(context).max(1);
        let end = start.saturating_add(context.saturating_mul(2));

        let lines = text
            .lines()
            .zip(1u64..)
            .skip_while(|(_, n)| *n < start)
            .take_while(|(_, n)| *n <= end)
            .map(|(l, n)| (n, l.to_string()))
            .collect();

        Self {
            file: file.as_ref().to_owned(),
            current: line,
            lines,
        }
    }
}

impl Display for SourceWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (n, text) in &self.lines {
            let marker = if *n == self.current { ">" } else { " " };
            writeln!(f, "{marker} {n:>4} {text}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TEXT: &str = "a\nb\nc\nd\ne\nf\ng\nh\n";

    fn numbers(w: &SourceWindow) -> Vec<u64> {
        w.lines.iter().map(|(n, _)| *n).collect()
    }

    #[test]
    fn test_window_is_centered() {
        let w = SourceWindow::from_source("x.c", TEXT, 5, 2);
        assert_eq!(numbers(&w), vec![3, 4, 5, 6, 7]);
        assert_eq!(w.lines[2].1, "e");
        assert!(w.to_string().contains(">    5 e"));
        assert!(w.to_string().contains("     4 d"));
    }

    #[test]
    fn test_window_near_the_edges() {
        let window =
            |line, context| numbers(&SourceWindow::from_source("x.c", TEXT, line, context));
        assert_eq!(window(1, 2), vec![1, 2, 3, 4, 5]);
        assert_eq!(window(2, 2), vec![1, 2, 3, 4, 5]);
        assert_eq!(window(8, 2), vec![6, 7, 8]);
        assert_eq!(window(4, 0), vec![4]);
    }

    #[test]
    fn test_huge_context_takes_the_whole_file() {
        let w = SourceWindow::from_source("x.c", TEXT, 5, usize::MAX);
        assert_eq!(numbers(&w), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(w.to_string().contains(">    5 e"));
    }

    #[test]
    fn test_missing_file() {
        assert!(SourceWindow::load("/definitely/not/here.c", 1, 2).is_err());
    }
}
