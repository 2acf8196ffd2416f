//! Configuration management for page-reader-rs.
//!
//! Loads config from YAML files in standard locations. Every section falls
//! back to defaults, so an empty or missing file is a valid configuration.

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::window::CropInsets;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Substring matched against window titles.
    pub title: String,
    pub crop: CropInsets,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Kindle".into(),
            crop: CropInsets {
                left: 75,
                top: 110,
                right: 20,
                bottom: 50,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub tesseract_path: String,
    pub language: String,
    /// When set, every captured page is saved here as PNG.
    pub debug_dir: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".into(),
            language: "eng".into(),
            debug_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TTSConfig {
    pub exe_path: String,
    pub host: String,
    pub port: u16,
    pub voice: String,
    #[serde(deserialize_with = "string_or_number")]
    pub rate: String,
    #[serde(deserialize_with = "string_or_number")]
    pub volume: String,
    pub use_tcp: bool,
    pub auto_start: bool,
    pub ready_timeout_ms: u64,
    pub ready_poll_ms: u64,
    pub voice_list_timeout_ms: u64,
    pub await_ack: bool,
    pub ack_grace_ms: u64,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            exe_path: "TtsApplication.exe".into(),
            host: "127.0.0.1".into(),
            port: 5150,
            voice: "Microsoft Guy(Natural)".into(),
            rate: "1".into(),
            volume: "30".into(),
            use_tcp: true,
            auto_start: true,
            ready_timeout_ms: 5000,
            ready_poll_ms: 100,
            voice_list_timeout_ms: 2000,
            await_ack: false,
            ack_grace_ms: 2000,
        }
    }
}

impl TTSConfig {
    /// Speaking rate as a multiplier. Unparsable values read as 1.0.
    pub fn rate_value(&self) -> f64 {
        parse_rate(&self.rate)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    pub base_wpm: f64,
    pub page_backoff_secs: f64,
    pub post_advance_delay_secs: f64,
    pub min_page_secs: f64,
    pub wait_for_window: bool,
    pub locate_poll_secs: f64,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            base_wpm: crate::estimator::DEFAULT_BASE_WPM,
            page_backoff_secs: 1.0,
            post_advance_delay_secs: 0.5,
            min_page_secs: 0.0,
            wait_for_window: false,
            locate_poll_secs: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PagerConfig {
    pub backend: String,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            backend: "window".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub catalog_path: Option<PathBuf>,
}

impl VoicesConfig {
    pub fn resolved_catalog_path(&self) -> PathBuf {
        self.catalog_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("page-reader")
                .join("voices.json")
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl HistoryConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".page-reader-history")
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub notifications: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub ocr: OcrConfig,
    pub tts: TTSConfig,
    pub reading: ReadingConfig,
    pub pager: PagerConfig,
    pub voices: VoicesConfig,
    pub history: HistoryConfig,
    pub feedback: FeedbackConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/page-reader/config.yaml
    /// 3. /etc/page-reader/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/page-reader/config.yaml")),
                Some(PathBuf::from("/etc/page-reader/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn page_backoff(&self) -> Duration {
        secs(self.reading.page_backoff_secs)
    }

    pub fn voice_list_timeout(&self) -> Duration {
        Duration::from_millis(self.tts.voice_list_timeout_ms)
    }
}

/// Parse a speaking-rate setting, falling back to 1.0.
pub fn parse_rate(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(r) if r.is_finite() => r,
        _ => 1.0,
    }
}

/// Seconds from config as a Duration; negative and NaN values read as zero.
pub fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

/// Resolve a bundled binary: absolute paths are used as-is, relative ones are
/// looked up next to the running executable, then left for PATH lookup.
pub fn resolve_bundled(path: &str) -> PathBuf {
    let direct = PathBuf::from(path);
    if direct.is_absolute() {
        return direct;
    }

    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join(path)));

    match beside_exe {
        Some(candidate) if candidate.exists() => candidate,
        _ => direct,
    }
}

/// Accept either a YAML string or number, keeping the textual form.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}
