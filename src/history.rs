//! Page log and reading reports.
//!
//! Every spoken page is appended to a daily JSONL file
//! (`<dir>/YYYY-MM-DD.jsonl`), which `report` turns into a Markdown summary.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, error};

use crate::text::word_count;

/// One spoken page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub timestamp: String,
    pub window_title: String,
    pub char_count: usize,
    pub word_count: usize,
    pub estimated_secs: f64,
    pub text: String,
}

impl PageRecord {
    pub fn new(window_title: &str, text: &str, estimated_secs: f64) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            window_title: window_title.to_string(),
            char_count: text.chars().count(),
            word_count: word_count(text),
            estimated_secs,
            text: text.to_string(),
        }
    }
}

pub struct PageLog {
    dir: PathBuf,
}

impl PageLog {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn resolve_date(date: &str) -> String {
        if date == "today" {
            Local::now().format("%Y-%m-%d").to_string()
        } else {
            date.to_string()
        }
    }

    fn file_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", Self::resolve_date(date)))
    }

    /// Append a record to today's file. Failures are logged, never returned.
    pub fn save(&self, record: &PageRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            error!("Failed to create page log dir: {e}");
            return;
        }

        let path = self.file_for("today");
        match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => match serde_json::to_string(record) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        error!("Failed to write page record: {e}");
                    } else {
                        debug!("Saved page record to {}", path.display());
                    }
                }
                Err(e) => error!("Failed to serialize page record: {e}"),
            },
            Err(e) => error!("Failed to open page log: {e}"),
        }
    }

    /// All records for a date (`YYYY-MM-DD` or `today`), malformed lines skipped.
    pub fn load_records(&self, date: &str) -> Vec<PageRecord> {
        let path = self.file_for(date);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!("Failed to load page records: {e}");
                return Vec::new();
            }
        };

        std::io::BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<PageRecord>(line.trim()) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!("Skipping malformed page log line: {e}");
                    None
                }
            })
            .collect()
    }

    /// Dates with a page log, newest first.
    pub fn list_available_dates(&self) -> Vec<String> {
        let mut dates: Vec<String> = fs::read_dir(&self.dir)
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let name = entry.ok()?.file_name().to_string_lossy().to_string();
                name.strip_suffix(".jsonl").map(str::to_string)
            })
            .collect();

        dates.sort_by(|a, b| b.cmp(a));
        dates
    }

    /// Markdown report for a date.
    pub fn generate_report(&self, date: &str) -> String {
        let records = self.load_records(date);
        let display_date = Self::resolve_date(date);

        if records.is_empty() {
            return format!("# Page Reader Report - {display_date}\n\nNo pages read.");
        }

        let total_words: usize = records.iter().map(|r| r.word_count).sum();
        let total_chars: usize = records.iter().map(|r| r.char_count).sum();
        let total_secs: f64 = records.iter().map(|r| r.estimated_secs).sum();
        let avg_words = total_words as f64 / records.len() as f64;

        let mut lines = vec![
            format!("# Page Reader Report - {display_date}"),
            String::new(),
            "## Summary".to_string(),
            format!("- **Pages**: {}", records.len()),
            format!("- **Total words**: {total_words}"),
            format!("- **Total characters**: {total_chars}"),
            format!("- **Estimated listening time**: {}", format_duration(total_secs)),
            format!("- **Average words per page**: {avg_words:.0}"),
            String::new(),
            "## Pages".to_string(),
            String::new(),
            "| Time | Window | Words | Est. | Text |".to_string(),
            "|------|--------|-------|------|------|".to_string(),
        ];

        for r in &records {
            // HH:MM:SS out of the ISO timestamp
            let time_str = r.timestamp.get(11..19).unwrap_or(&r.timestamp);
            lines.push(format!(
                "| {time_str} | {} | {} | {} | {} |",
                truncate(&r.window_title, 20),
                r.word_count,
                format_duration(r.estimated_secs),
                truncate(&r.text, 40).replace('|', "/"),
            ));
        }

        lines.join("\n")
    }
}

fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        let minutes = (seconds / 60.0) as u64;
        let secs = seconds % 60.0;
        if minutes < 60 {
            format!("{minutes}m {secs:.0}s")
        } else {
            let hours = minutes / 60;
            let mins = minutes % 60;
            format!("{hours}h {mins}m")
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_today() {
        let dir = tempfile::tempdir().unwrap();
        let log = PageLog::new(dir.path().join("history"));

        log.save(&PageRecord::new("Kindle", "Hello world", 0.67));
        log.save(&PageRecord::new("Kindle", "Second page here", 1.0));

        let records = log.load_records("today");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "Hello world");
        assert_eq!(records[0].word_count, 2);
        assert_eq!(records[1].char_count, 16);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = PageLog::new(dir.path().to_path_buf());
        let good = serde_json::to_string(&PageRecord::new("K", "ok", 0.3)).unwrap();
        fs::write(
            dir.path().join("2024-03-01.jsonl"),
            format!("{good}\nnot json\n\n{good}\n"),
        )
        .unwrap();

        assert_eq!(log.load_records("2024-03-01").len(), 2);
        assert!(log.load_records("2024-03-02").is_empty());
    }

    #[test]
    fn test_list_dates_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2024-01-02.jsonl", "2024-03-01.jsonl", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let log = PageLog::new(dir.path().to_path_buf());
        assert_eq!(log.list_available_dates(), ["2024-03-01", "2024-01-02"]);
    }

    #[test]
    fn test_list_dates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log = PageLog::new(dir.path().join("absent"));
        assert!(log.list_available_dates().is_empty());
    }

    #[test]
    fn test_report() {
        let dir = tempfile::tempdir().unwrap();
        let log = PageLog::new(dir.path().to_path_buf());
        assert!(log.generate_report("today").contains("No pages read."));

        log.save(&PageRecord::new("Kindle", "a | b", 90.0));
        let report = log.generate_report("today");
        assert!(report.contains("- **Pages**: 1"));
        assert!(report.contains("- **Total words**: 3"));
        assert!(report.contains("1m 30s"));
        assert!(report.contains("a / b"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5.0), "5.0s");
        assert_eq!(format_duration(125.0), "2m 5s");
        assert_eq!(format_duration(7260.0), "2h 1m");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("\u{201C}abcdefgh\u{201D}", 6), "\u{201C}ab...");
    }
}
