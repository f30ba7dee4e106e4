//! Hidden password entry on the controlling terminal.
//!
//! Keys are read as crossterm events in raw mode, so nothing is echoed and
//! Ctrl-C arrives as a key press instead of a signal. The raw-mode guard
//! restores the terminal whenever the prompt future finishes or is dropped.

use std::io::{self, Write};

use async_trait::async_trait;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;

use crate::{
    core::error::DeployError,
    deployment::connection::{PasswordPrompt, Target},
};

#[derive(Debug, PartialEq, Eq)]
pub enum PromptStep {
    Continue,
    Submit,
    Interrupt,
}

/// Apply one key press to the password being typed.
pub fn apply_key(password: &mut String, key: KeyEvent) -> PromptStep {
    if key.kind != KeyEventKind::Press {
        return PromptStep::Continue;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => PromptStep::Interrupt,
        KeyCode::Enter => PromptStep::Submit,
        KeyCode::Backspace => {
            password.pop();
            PromptStep::Continue
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            password.push(c);
            PromptStep::Continue
        }
        _ => PromptStep::Continue,
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            tracing::error!("Failed to disable raw mode: {}", e);
            let _ = writeln!(io::stderr(), "\r\nWarning: Failed to restore terminal mode");
        }
    }
}

/// Reads the password from the terminal without echo.
pub struct TerminalPrompt;

#[async_trait]
impl PasswordPrompt for TerminalPrompt {
    async fn prompt(&mut self, target: &Target) -> Result<String, DeployError> {
        print!("{}@{}'s password: ", target.user, target.host);
        io::stdout().flush().map_err(DeployError::Prompt)?;

        let guard = RawModeGuard::new().map_err(DeployError::Prompt)?;
        let mut events = EventStream::new();
        let mut password = String::new();
        let mut step = PromptStep::Continue;
        while let Some(event) = events.next().await {
            if let Event::Key(key) = event.map_err(DeployError::Prompt)? {
                step = apply_key(&mut password, key);
                if step != PromptStep::Continue {
                    break;
                }
            }
        }
        drop(guard);
        println!();

        match step {
            PromptStep::Submit => Ok(password),
            PromptStep::Interrupt => Err(DeployError::Interrupted),
            PromptStep::Continue => Err(DeployError::Prompt(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "terminal closed before the password was entered",
            ))),
        }
    }
}
