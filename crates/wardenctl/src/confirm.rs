//! Terminal confirmation prompt
//!
//! Blocks until the user answers. `yes`/`y` (any case) approves; anything
//! else, including end of input, declines.

use owo_colors::OwoColorize;
use std::io::{self, BufRead, Stdout, Write};
use std::sync::Mutex;
use warden_common::Confirmer;

/// Whether an answer approves the action
pub fn is_approval(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "yes" | "y")
}

/// Line-oriented input shared by the session loop and the prompt
pub trait LineSource {
    /// Append one line to `buf`; 0 means end of input
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize>;
}

impl<R: BufRead> LineSource for R {
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        BufRead::read_line(self, buf)
    }
}

/// Terminal input that takes the stdin lock only for the duration of a line
pub struct TerminalInput;

impl LineSource for TerminalInput {
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        io::stdin().read_line(buf)
    }
}

/// Confirmer reading answers line by line
pub struct PromptConfirmer<R, W> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl<R: LineSource, W: Write> PromptConfirmer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Consume the confirmer and return what was written
    pub fn into_output(self) -> W {
        match self.output.into_inner() {
            Ok(output) => output,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PromptConfirmer<TerminalInput, Stdout> {
    /// Prompt on the terminal
    pub fn stdio() -> Self {
        Self::new(TerminalInput, io::stdout())
    }
}

impl<R: LineSource, W: Write> Confirmer for PromptConfirmer<R, W> {
    fn confirm(&self, action: &str) -> io::Result<bool> {
        let mut output = self
            .output
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "prompt output poisoned"))?;
        writeln!(output)?;
        writeln!(output, "{}", "⚠️  Confirmation required:".yellow().bold())?;
        writeln!(output, "   {}", action.bright_white())?;
        write!(output, "   {} ", "Proceed? (yes/no):".bright_magenta())?;
        output.flush()?;

        let mut answer = String::new();
        let mut input = self
            .input
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "prompt input poisoned"))?;
        let read = LineSource::read_line(&mut *input, &mut answer)?;

        if read == 0 {
            writeln!(output)?;
            return Ok(false);
        }
        Ok(is_approval(&answer))
    }
}
