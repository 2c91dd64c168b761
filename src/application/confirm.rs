use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

/// Asks the admin to confirm a destructive action.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Interactive `[y/N]` prompt on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        let answer = prompt_line(&format!("{prompt} [y/N]: "))?;
        Ok(is_affirmative(&answer))
    }
}

/// `--yes`
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Print `prompt` and read one line from stdin, without the newline.
pub fn prompt_line(prompt: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
