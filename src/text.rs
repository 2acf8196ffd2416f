//! Text cleanup for OCR output and speech requests.

/// Normalize raw OCR output into speakable text.
///
/// Collapses every whitespace run to one space, trims the ends, drops the
/// `"- "` left behind by hyphenated line breaks and straightens curly quotes.
/// An empty result means the page had nothing worth speaking.
pub fn normalize(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    collapsed
        .replace("- ", "")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

/// Flatten text onto a single line for the line-delimited speech protocol.
pub fn flatten(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

/// Number of whitespace-delimited words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Short single-line preview for log output.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
