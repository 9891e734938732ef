// src/select.rs

use async_trait::async_trait;
use std::io::{self, BufRead, Write};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Interactive choice among named items. `Ok(None)` means the user declined.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn choose(&self, title: &str, items: &[String]) -> Result<Option<usize>, String>;
}

/// Numbered list on stderr, answer on stdin.
pub struct TerminalPrompter {
    max_attempts: u32,
}

impl TerminalPrompter {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1) }
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    /// Reads stdin on the blocking pool so the runtime keeps serving signals
    /// while the user is thinking.
    async fn choose(&self, title: &str, items: &[String]) -> Result<Option<usize>, String> {
        let title = title.to_string();
        let items = items.to_vec();
        let max_attempts = self.max_attempts;

        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut output = io::stderr();
            choose_from(&title, &items, &mut input, &mut output, max_attempts)
        })
        .await
        .map_err(|e| format!("Prompt task failed: {}", e))?
    }
}

/// Accepts a 1-based number or an exact name; `q` declines. Invalid answers
/// re-prompt up to `max_attempts` times in total.
pub fn choose_from<R: BufRead, W: Write>(
    title: &str,
    items: &[String],
    input: &mut R,
    output: &mut W,
    max_attempts: u32,
) -> Result<Option<usize>, String> {
    if items.is_empty() {
        return Err(format!("Nothing to choose from for '{}'", title));
    }

    let io_err = |e: io::Error| format!("Prompt I/O failed: {}", e);

    writeln!(output, "\n{}:", title).map_err(io_err)?;
    for (i, item) in items.iter().enumerate() {
        writeln!(output, "  {:>3}) {}", i + 1, item).map_err(io_err)?;
    }

    for attempt in 1..=max_attempts {
        write!(output, "Select [1-{}] or q to cancel: ", items.len()).map_err(io_err)?;
        output.flush().map_err(io_err)?;

        let mut line = String::new();
        if input.read_line(&mut line).map_err(io_err)? == 0 {
            return Err("Input closed before a selection was made".into());
        }
        let answer = line.trim();

        if answer.eq_ignore_ascii_case("q") || answer.eq_ignore_ascii_case("quit") {
            return Ok(None);
        }
        if let Ok(n) = answer.parse::<usize>() {
            if (1..=items.len()).contains(&n) {
                return Ok(Some(n - 1));
            }
        }
        if let Some(index) = items.iter().position(|item| item == answer) {
            return Ok(Some(index));
        }

        if attempt < max_attempts {
            writeln!(output, "Invalid selection '{}'. Try again.", answer).map_err(io_err)?;
        }
    }

    Err(format!("No valid selection after {} attempts", max_attempts))
}
