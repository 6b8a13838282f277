use std::fmt;
use std::str::FromStr;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Timelike, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

// @module: Caption normalization and serialization

/// Requested output representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Numbered, timestamped subtitle-exchange (SRT) text
    #[default]
    Srt,
    /// Cue text only, one cue per line
    Text,
}

impl OutputFormat {
    // @returns: Lowercase format identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "srt" => Ok(Self::Srt),
            "text" | "txt" => Ok(Self::Text),
            _ => Err(anyhow!("Invalid output format: {}", s)),
        }
    }
}

/// Raw cue as returned by the YouTube transcript fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetDurationCue {
    /// Start in seconds
    pub offset: f64,
    /// Length in seconds
    pub duration: f64,
    /// Caption text
    pub text: String,
}

/// Raw cue as found in a Bilibili caption payload `body`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromToCue {
    /// Start in seconds
    pub from: f64,
    /// End in seconds
    pub to: f64,
    /// Caption text
    pub content: String,
}

// @struct: Normalized caption cue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cue {
    // @field: 1-based position in the document
    pub index: usize,

    // @field: Start in seconds
    pub start_seconds: f64,

    // @field: End in seconds
    pub end_seconds: f64,

    // @field: Caption text
    pub text: String,
}

impl Cue {
    pub fn new(index: usize, start_seconds: f64, end_seconds: f64, text: impl Into<String>) -> Self {
        Cue {
            index,
            start_seconds,
            end_seconds,
            text: text.into(),
        }
    }

    /// Start time as `HH:MM:SS,mmm`
    pub fn format_start_time(&self) -> String {
        format_timestamp(self.start_seconds)
    }

    /// End time as `HH:MM:SS,mmm`
    pub fn format_end_time(&self) -> String {
        format_timestamp(self.end_seconds)
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.index)?;
        writeln!(f, "{} --> {}", self.format_start_time(), self.format_end_time())?;
        writeln!(f, "{}", self.text)
    }
}

/// Format a time in seconds as a subtitle timestamp (HH:MM:SS,mmm).
///
/// The value is read as milliseconds since the Unix epoch and rendered as a UTC
/// wall-clock time, so hours wrap at 24 and negative inputs show the previous
/// day's clock. Fractional milliseconds are truncated.
pub fn format_timestamp(seconds: f64) -> String {
    let millis = (seconds * 1000.0).trunc();
    let clock = if millis.is_finite() && millis.abs() <= i64::MAX as f64 {
        DateTime::<Utc>::from_timestamp_millis(millis as i64)
    } else {
        None
    };

    match clock {
        Some(time) => format!(
            "{:02}:{:02}:{:02},{:03}",
            time.hour(),
            time.minute(),
            time.second(),
            time.timestamp_subsec_millis()
        ),
        None => {
            warn!("Cannot represent {} seconds as a clock time", seconds);
            "00:00:00,000".to_string()
        }
    }
}

/// Ordered cues plus the representation they were requested in
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleDocument {
    cues: Vec<Cue>,
    format: OutputFormat,
}

impl SubtitleDocument {
    /// Build a document from already-normalized cues
    pub fn new(cues: Vec<Cue>, format: OutputFormat) -> Self {
        SubtitleDocument { cues, format }
    }

    /// Map `{offset, duration}` cues, `end = offset + duration`
    pub fn from_offset_duration(raw: &[OffsetDurationCue], format: OutputFormat) -> Self {
        let cues = raw
            .iter()
            .enumerate()
            .map(|(i, sub)| Cue::new(i + 1, sub.offset, sub.offset + sub.duration, sub.text.clone()))
            .collect();
        Self::new(cues, format)
    }

    /// Map `{from, to}` cues, `end = to`
    pub fn from_from_to(raw: &[FromToCue], format: OutputFormat) -> Self {
        let cues = raw
            .iter()
            .enumerate()
            .map(|(i, sub)| Cue::new(i + 1, sub.from, sub.to, sub.content.clone()))
            .collect();
        Self::new(cues, format)
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Serialize in the requested format
    pub fn render(&self) -> String {
        match self.format {
            OutputFormat::Srt => self.to_srt(),
            OutputFormat::Text => self.to_plain_text(),
        }
    }

    /// One block per cue, blocks separated by a blank line
    pub fn to_srt(&self) -> String {
        self.cues
            .iter()
            .map(|cue| cue.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Cue texts joined by newlines, timing dropped
    pub fn to_plain_text(&self) -> String {
        self.cues
            .iter()
            .map(|cue| cue.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
