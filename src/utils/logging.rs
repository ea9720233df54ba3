//! Optional transcript logging to a plain-text file.
//!
//! When `--log <file>` is given, completed turns are appended as they finish.
//! The API credential never passes through here.

use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub struct TranscriptLog {
    file_path: Option<String>,
}

impl TranscriptLog {
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let log = TranscriptLog {
            file_path: log_file,
        };
        if log.is_active() {
            log.append(&format!("## Session started at {}", Utc::now().to_rfc3339()))?;
        }
        Ok(log)
    }

    pub fn is_active(&self) -> bool {
        self.file_path.is_some()
    }

    pub fn log_user_turn(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.append(&format!("You: {content}"))
    }

    pub fn log_assistant_turn(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.append(content)
    }

    pub fn status_string(&self) -> String {
        match &self.file_path {
            None => "off".to_string(),
            Some(path) => format!(
                "on ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
        }
    }

    fn append(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        for line in content.lines() {
            writeln!(file, "{}", line)?;
        }
        // Blank line between turns, matching on-screen spacing
        writeln!(file)?;

        file.flush()?;
        Ok(())
    }
}
