pub mod history;

use anyhow::{Context, Result};
use colored::*;
use log::warn;
use nix::unistd::isatty;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor, EditMode};
use std::io::{self, BufRead, Write};
use std::os::unix::io::AsRawFd;

use self::history::History;
use crate::config;

/// Where command lines come from. `Ok(None)` means end of input.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Picks the interactive editor when stdin is a terminal and a plain line
/// reader otherwise.
pub fn open(config: &config::Config) -> Result<Box<dyn LineSource>> {
    let stdin = io::stdin();
    if isatty(stdin.as_raw_fd()).unwrap_or(false) {
        Ok(Box::new(Terminal::new(config)?))
    } else {
        Ok(Box::new(PlainInput::new()))
    }
}

/// Interactive line editing on top of rustyline.
pub struct Terminal {
    editor: DefaultEditor,
    history: Option<History>,
}

impl Terminal {
    pub fn new(config: &config::Config) -> Result<Self> {
        let editor_config = Config::builder()
            .edit_mode(EditMode::Emacs)
            .auto_add_history(false)
            .build();

        let mut editor =
            DefaultEditor::with_config(editor_config).context("Failed to set up line editor")?;

        let history = match &config.history_file {
            Some(path) => match History::open(path, config.history_size) {
                Ok(history) => Some(history),
                Err(e) => {
                    warn!("History disabled: {:#}", e);
                    None
                }
            },
            None => None,
        };

        if let Some(history) = &history {
            for entry in history.entries() {
                editor.add_history_entry(entry.as_str())?;
            }
        }

        Ok(Terminal { editor, history })
    }
}

impl LineSource for Terminal {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let prompt = prompt.bright_blue().to_string();

        let line = match self.editor.readline(&prompt) {
            Ok(line) => line,
            // Ctrl+C at the prompt just discards the line
            Err(ReadlineError::Interrupted) => return Ok(Some(String::new())),
            Err(ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err).context("Error reading input"),
        };

        if !line.trim().is_empty() {
            self.editor.add_history_entry(line.as_str())?;
            if let Some(history) = &mut self.history {
                if let Err(e) = history.add(&line) {
                    warn!("Failed to record history: {:#}", e);
                }
            }
        }

        Ok(Some(line))
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if let Some(history) = &self.history {
            if let Err(e) = history.save() {
                warn!("Failed to save history: {:#}", e);
            }
        }
    }
}

/// Prompt on stdout, one line from stdin. Used for pipes and files.
pub struct PlainInput {
    stdin: io::StdinLock<'static>,
}

impl PlainInput {
    pub fn new() -> Self {
        PlainInput {
            stdin: io::stdin().lock(),
        }
    }
}

impl LineSource for PlainInput {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;

        let mut line = String::new();
        let read = self
            .stdin
            .read_line(&mut line)
            .context("Error reading input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}
