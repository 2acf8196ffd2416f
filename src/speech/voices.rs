//! Voice catalog: parsing the server's `list-voices` reply and keeping the
//! last result on disk.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

lazy_static! {
    static ref VOICE_LINE: Regex = Regex::new(r"^Voice\[(\d+)\]:\s*(.+)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub locale: String,
    /// The server line this entry was parsed from.
    #[serde(default)]
    pub raw: String,
}

impl Voice {
    /// Parse `Voice[<index>]: <name> - <locale>`. The locale part is optional.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let caps = VOICE_LINE.captures(line)?;
        let index = caps[1].parse().ok()?;
        let label = caps[2].trim();

        let (name, locale) = label.split_once(" - ").unwrap_or((label, ""));

        Some(Self {
            index,
            name: name.trim().to_string(),
            locale: locale.trim().to_string(),
            raw: line.to_string(),
        })
    }

    /// Display label, `name - locale` or just the name.
    pub fn label(&self) -> String {
        if self.locale.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.locale)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Voices in the order the server listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceCatalog {
    voices: Vec<Voice>,
}

impl VoiceCatalog {
    /// Build a catalog from response lines, skipping anything unparsable.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let voices = lines
            .into_iter()
            .filter_map(|line| {
                let parsed = Voice::parse(line.as_ref());
                if parsed.is_none() {
                    debug!("Skipping voice line: {}", line.as_ref());
                }
                parsed
            })
            .collect();
        Self { voices }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.name == name)
    }

    /// Case-insensitive substring match over voice labels.
    pub fn filter(&self, query: &str) -> Vec<&Voice> {
        let query = query.to_lowercase();
        self.voices
            .iter()
            .filter(|v| v.label().to_lowercase().contains(&query))
            .collect()
    }

    /// Write the catalog, replacing whatever was there.
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!("Saved {} voices to {}", self.len(), path.display());
        Ok(())
    }

    /// Read a saved catalog. A missing or unreadable file gives an empty one.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Failed to read voices from {}: {e}", path.display());
                return Self::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("Failed to parse voices in {}: {e}", path.display());
            Self::default()
        })
    }
}
