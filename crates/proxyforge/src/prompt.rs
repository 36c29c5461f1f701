//! Line-based operator prompts.

use crate::plan::{Conflict, ConflictChoice, ConflictPrompt};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Asks the operator about each conflict on a terminal.
///
/// End of input is answered with `Skip` so an unattended run never blocks.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn describe(&mut self, conflict: &Conflict<'_>) -> io::Result<()> {
        writeln!(
            self.output,
            "\nExisting proxy found for {}",
            file_name(conflict.source)
        )?;
        writeln!(
            self.output,
            "  Existing: {} ({})",
            file_name(conflict.existing),
            extension(conflict.existing)
        )?;
        writeln!(
            self.output,
            "  New:      {} ({})",
            file_name(conflict.planned),
            extension(conflict.planned)
        )?;
        writeln!(self.output, "\nOptions:")?;
        writeln!(self.output, "  y/yes       - Create duplicate proxy with new codec")?;
        writeln!(self.output, "  s/skip      - Skip this file")?;
        writeln!(self.output, "  ya/yes-all  - Create duplicates for all remaining files")?;
        writeln!(self.output, "  sa/skip-all - Skip all remaining files with existing proxies")
    }

    /// Reads one trimmed line; `None` on end of input or read failure
    fn read_answer(&mut self, question: &str) -> Option<String> {
        write!(self.output, "{}", question).ok()?;
        self.output.flush().ok()?;
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    /// Yes/no question defaulting to no.
    pub fn confirm(&mut self, question: &str) -> bool {
        loop {
            let Some(answer) = self.read_answer(&format!("{} (y/N): ", question)) else {
                return false;
            };
            match answer.to_lowercase().as_str() {
                "y" | "yes" => return true,
                "" | "n" | "no" => return false,
                _ => {
                    let _ = writeln!(self.output, "Please enter 'y' for yes or 'n' for no.");
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> ConflictPrompt for TerminalPrompt<R, W> {
    fn choose(&mut self, conflict: &Conflict<'_>) -> ConflictChoice {
        if self.describe(conflict).is_err() {
            return ConflictChoice::Skip;
        }
        loop {
            let Some(answer) = self.read_answer("Choice [y/s/ya/sa]: ") else {
                return ConflictChoice::Skip;
            };
            match ConflictChoice::parse(&answer) {
                Some(choice) => return choice,
                None => {
                    let _ = writeln!(self.output, "Invalid choice. Please enter y, s, ya, or sa.");
                }
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_uppercase())
        .unwrap_or_default()
}
