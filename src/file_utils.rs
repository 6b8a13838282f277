use anyhow::{Result, Context};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

use crate::subtitle_format::OutputFormat;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        }
        Ok(())
    }

    // @returns: Local-time stamp YYYYMMDD_HHMMSS
    pub fn generate_timestamp() -> String {
        Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    // @returns: File extension for an output format
    pub fn extension_for(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Srt => "srt",
            OutputFormat::Text => "txt",
        }
    }

    // @generates: Unused path <dir>/<stem>.<ext>, suffixing _1, _2, ... on collision
    pub fn unique_output_path<P: AsRef<Path>>(output_dir: P, stem: &str, extension: &str) -> PathBuf {
        let output_dir = output_dir.as_ref();
        let mut candidate = output_dir.join(format!("{}.{}", stem, extension));
        let mut counter = 1;
        while candidate.exists() {
            candidate = output_dir.join(format!("{}_{}.{}", stem, counter, extension));
            counter += 1;
        }
        candidate
    }

    /// Save rendered subtitles under a timestamped name and return the path
    pub fn save_subtitles<P: AsRef<Path>>(output_dir: P, content: &str, format: OutputFormat) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();
        Self::ensure_dir(output_dir)?;

        let path = Self::unique_output_path(output_dir, &Self::generate_timestamp(), Self::extension_for(format));
        fs::write(&path, content)
            .with_context(|| format!("Failed to write subtitle file: {}", path.display()))?;

        Ok(path)
    }
}
