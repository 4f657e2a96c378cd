use std::io::Write;
use std::path::PathBuf;

use super::{Tool, ToolDescriptor, ToolError};

const DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    name: "note_saver",
    description: "this tool can save a text based note to a file for the user",
    parameter: "note",
};

/// Appends notes, one per line, to a flat text file.
pub struct NoteSink {
    path: PathBuf,
}

impl NoteSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append `note` plus a newline, creating the file if absent.
    pub fn record(&self, note: &str) -> Result<String, ToolError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", note)?;

        log::info!("NoteSink: saved note to {}", self.path.display());
        Ok("note saved".to_string())
    }
}

#[async_trait::async_trait]
impl Tool for NoteSink {
    fn descriptor(&self) -> &ToolDescriptor {
        &DESCRIPTOR
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        self.record(input)
    }
}
