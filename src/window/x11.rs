//! X11 backend: xdotool for lookup and key posting, ImageMagick `import`
//! for capture. Both talk to the window by id, so the reader never has to be
//! focused or raised.

use std::process::Command;

use image::DynamicImage;
use tracing::debug;

use super::{WindowError, WindowHandle};

pub fn declare_dpi_aware() {}

/// xdotool compiles `--name` as a case-insensitive POSIX extended regex.
/// Escape the title so it matches literally.
fn name_pattern(title: &str) -> String {
    let mut pattern = String::with_capacity(title.len());
    for c in title.chars() {
        if matches!(
            c,
            '.' | '[' | ']' | '(' | ')' | '{' | '}' | '*' | '+' | '?' | '|' | '^' | '$' | '\\'
        ) {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

fn search_args(title: &str) -> Vec<String> {
    vec![
        "search".into(),
        "--onlyvisible".into(),
        "--name".into(),
        name_pattern(title),
    ]
}

pub fn find_window(title: &str) -> Option<WindowHandle> {
    let output = Command::new("xdotool").args(search_args(title)).output().ok()?;

    if !output.status.success() {
        return None;
    }

    // The search ignores case, the title match does not
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse::<u64>().ok())
        .map(WindowHandle)
        .find(|&handle| window_name(handle).is_some_and(|name| name.contains(title)))
}

fn window_name(handle: WindowHandle) -> Option<String> {
    let output = Command::new("xdotool")
        .args(["getwindowname", &handle.0.to_string()])
        .output()
        .ok()?;

    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

fn window_exists(handle: WindowHandle) -> bool {
    window_name(handle).is_some()
}

pub fn capture_client(handle: WindowHandle) -> Result<DynamicImage, WindowError> {
    if !window_exists(handle) {
        return Err(WindowError::Gone(handle));
    }

    let output = Command::new("import")
        .args(["-silent", "-window", &handle.0.to_string(), "png:-"])
        .output()
        .map_err(|e| WindowError::Capture(format!("Failed to run import: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("import failed for {handle}: {stderr}");
        if !window_exists(handle) {
            return Err(WindowError::Gone(handle));
        }
        return Err(WindowError::Capture(stderr.trim().to_string()));
    }

    image::load_from_memory(&output.stdout)
        .map_err(|e| WindowError::Capture(format!("Failed to decode capture: {e}")))
}

pub fn post_forward_key(handle: WindowHandle) -> Result<(), String> {
    let status = Command::new("xdotool")
        .args(["key", "--window", &handle.0.to_string(), "Right"])
        .status()
        .map_err(|e| format!("xdotool failed: {e}"))?;

    if !status.success() {
        return Err("xdotool exited with non-zero status".to_string());
    }
    Ok(())
}
