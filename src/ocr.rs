//! Page text extraction.
//!
//! The engine is the Tesseract CLI fed a PNG over stdin. Every extraction in
//! the process goes through one async gate, and the guard travels into the
//! blocking task so it is held until the engine actually returns.

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, ImageFormat};
use lazy_static::lazy_static;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::config::{resolve_bundled, OcrConfig};
use crate::text::normalize;
use crate::window::Page;

lazy_static! {
    static ref OCR_GATE: Arc<AsyncMutex<()>> = Arc::new(AsyncMutex::new(()));
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR engine failed: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Image-to-text backend. Implementations may assume they are never called
/// concurrently.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

pub struct TesseractEngine {
    binary_path: PathBuf,
    language: String,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary_path: resolve_bundled(&config.tesseract_path),
            language: config.language.clone(),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.binary_path)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Tesseract reads all of stdin before writing anything. A write error
        // usually means it already exited, so reap it and report its status.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&png),
            None => Ok(()),
        };

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "{} ({})",
                stderr.trim(),
                output.status
            )));
        }
        written?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Serialized, normalized OCR over captured pages.
#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
    gate: Arc<AsyncMutex<()>>,
}

impl TextExtractor {
    /// Uses the process-wide gate.
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self::with_gate(engine, OCR_GATE.clone())
    }

    pub fn with_gate(engine: Arc<dyn OcrEngine>, gate: Arc<AsyncMutex<()>>) -> Self {
        Self { engine, gate }
    }

    /// Extract and normalize the page text. Engine failures come back as an
    /// empty string, same as a page with nothing legible on it.
    pub async fn extract(&self, page: Page) -> String {
        let permit = self.gate.clone().lock_owned().await;
        let engine = self.engine.clone();

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let start = Instant::now();
            let result = engine.recognize(&page.image);
            debug!(
                "OCR on {}x{} took {:?}",
                page.image.width(),
                page.image.height(),
                start.elapsed()
            );
            result
        })
        .await;

        match result {
            Ok(Ok(raw)) => normalize(&raw),
            Ok(Err(e)) => {
                warn!("{e}");
                String::new()
            }
            Err(e) => {
                warn!("OCR task failed: {e}");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn blank_page() -> Page {
        Page {
            image: DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
            rect: (0, 0, 4, 4),
        }
    }

    struct FixedEngine(&'static str);

    impl OcrEngine for FixedEngine {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingEngine;

    impl OcrEngine for FailingEngine {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            Err(OcrError::Engine("engine exploded".into()))
        }
    }

    /// Panics if entered while another call is still inside.
    struct ReentrancyProbe {
        busy: AtomicBool,
        calls: AtomicUsize,
    }

    impl OcrEngine for ReentrancyProbe {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            assert!(
                !self.busy.swap(true, Ordering::SeqCst),
                "OCR engine entered concurrently"
            );
            std::thread::sleep(Duration::from_millis(20));
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.busy.store(false, Ordering::SeqCst);
            Ok("page".into())
        }
    }

    #[tokio::test]
    async fn test_output_is_normalized() {
        let extractor = TextExtractor::with_gate(
            Arc::new(FixedEngine("  Hello\n  wor- ld \u{201C}x\u{201D}\n")),
            Arc::new(AsyncMutex::new(())),
        );
        assert_eq!(extractor.extract(blank_page()).await, "Hello world \"x\"");
    }

    #[tokio::test]
    async fn test_engine_error_maps_to_empty() {
        let extractor =
            TextExtractor::with_gate(Arc::new(FailingEngine), Arc::new(AsyncMutex::new(())));
        assert_eq!(extractor.extract(blank_page()).await, "");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_extractions_are_serialized() {
        let probe = Arc::new(ReentrancyProbe {
            busy: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        let extractor =
            TextExtractor::with_gate(probe.clone(), Arc::new(AsyncMutex::new(())));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let extractor = extractor.clone();
            tasks.push(tokio::spawn(async move { extractor.extract(blank_page()).await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), "page");
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 6);
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_exiting_early_reports_status() {
        // Noise compresses badly, so the PNG is bigger than a pipe buffer
        let mut seed: u32 = 0x2545_f491;
        let noise = RgbImage::from_fn(700, 450, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let [r, g, b, _] = seed.to_le_bytes();
            image::Rgb([r, g, b])
        });
        let engine = TesseractEngine::new(&OcrConfig {
            tesseract_path: "/bin/false".into(),
            ..OcrConfig::default()
        });

        for _ in 0..3 {
            match engine.recognize(&DynamicImage::ImageRgb8(noise.clone())) {
                Err(OcrError::Engine(msg)) => assert!(msg.contains("exit status"), "{msg}"),
                other => panic!("expected engine error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_missing_tesseract_maps_to_empty() {
        let engine = TesseractEngine::new(&OcrConfig {
            tesseract_path: "/nonexistent/tesseract".into(),
            ..OcrConfig::default()
        });
        let extractor = TextExtractor::with_gate(Arc::new(engine), Arc::new(AsyncMutex::new(())));
        assert_eq!(extractor.extract(blank_page()).await, "");
    }
}
