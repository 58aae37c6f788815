use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Command history persisted one entry per line.
pub struct History {
    history_file: PathBuf,
    max_history_size: usize,
    entries: Vec<String>,
}

impl History {
    pub fn open(history_file: &Path, max_history_size: usize) -> Result<Self> {
        let mut history = History {
            history_file: history_file.to_path_buf(),
            max_history_size,
            entries: Vec::new(),
        };

        history.load()?;
        Ok(history)
    }

    pub fn load(&mut self) -> Result<()> {
        if !self.history_file.exists() {
            return Ok(());
        }

        let file = File::open(&self.history_file)
            .with_context(|| format!("Failed to open {}", self.history_file.display()))?;
        let reader = BufReader::new(file);

        self.entries.clear();
        for entry in reader.lines().map_while(|line| line.ok()) {
            if !entry.trim().is_empty() {
                self.entries.push(entry);
            }
        }

        self.trim();
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.history_file)
            .with_context(|| format!("Failed to write {}", self.history_file.display()))?;

        for entry in &self.entries {
            writeln!(file, "{}", entry)?;
        }

        Ok(())
    }

    pub fn add(&mut self, entry: &str) -> Result<()> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Ok(());
        }

        // Don't add duplicate of the last command
        if self.entries.last().map_or(false, |last| last == entry) {
            return Ok(());
        }

        self.entries.push(entry.to_string());
        self.trim();
        self.save()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    fn trim(&mut self) {
        if self.entries.len() > self.max_history_size {
            let excess = self.entries.len() - self.max_history_size;
            self.entries.drain(..excess);
        }
    }
}
