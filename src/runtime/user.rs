//! User interaction operations (confirmation prompts).

use anyhow::Result;

use super::RealRuntime;

use std::io::{self, BufRead, Write};

/// Reads a yes/no answer from `input` after writing `prompt` to `output`.
/// Anything other than `y`/`yes` (case-insensitive) counts as no.
pub(crate) fn confirm_with_io<R: BufRead, W: Write>(
    prompt: &str,
    input: &mut R,
    output: &mut W,
) -> Result<bool> {
    write!(output, "{} [y/N] ", prompt)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    let response = line.trim().to_lowercase();
    Ok(response == "y" || response == "yes")
}

impl RealRuntime {
    pub(crate) fn confirm_impl(&self, prompt: &str) -> Result<bool> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut stdin_lock = stdin.lock();
        confirm_with_io(prompt, &mut stdin_lock, &mut stdout)
    }
}
