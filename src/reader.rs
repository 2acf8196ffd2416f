//! The page-reading loop.
//!
//! LOCATING → READING → (BACKOFF →) READING ... → STOPPED
//!
//! Each cycle captures the page, extracts its text, hands it to the speaker,
//! waits out the estimated speaking time and turns the page. Cancellation is
//! only checked between cycles, so a started cycle always runs to the end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{secs, Config};
use crate::estimator::DurationEstimator;
use crate::history::{PageLog, PageRecord};
use crate::ocr::TextExtractor;
use crate::pager::PageAdvancer;
use crate::speech::{Delivery, SpeechError, Speaker};
use crate::text::{preview, word_count};
use crate::window::{CropInsets, Page, WindowCapture, WindowError, WindowHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Locating,
    Reading,
    Backoff,
    Stopped,
}

impl std::fmt::Display for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locating => write!(f, "LOCATING"),
            Self::Reading => write!(f, "READING"),
            Self::Backoff => write!(f, "BACKOFF"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Status published to whoever is driving the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Running,
    Locating,
    Error(String),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Running => write!(f, "Running"),
            Self::Locating => write!(f, "Waiting for window"),
            Self::Error(msg) => write!(f, "{msg}"),
        }
    }
}

/// What to do when the target window is not there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatePolicy {
    /// End the session with [`ReaderError::WindowNotFound`].
    FailFast,
    /// Keep looking at this interval until found or cancelled.
    Poll(Duration),
}

/// Settings snapshot taken when the session starts.
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub window_title: String,
    pub crop: CropInsets,
    pub rate: f64,
    pub page_backoff: Duration,
    pub post_advance_delay: Duration,
    pub min_page_wait: Duration,
    pub locate: LocatePolicy,
    pub await_ack: bool,
    pub ack_grace: Duration,
    pub debug_dir: Option<PathBuf>,
}

impl ReaderSettings {
    pub fn from_config(config: &Config) -> Self {
        let locate = if config.reading.wait_for_window {
            let interval = secs(config.reading.locate_poll_secs).max(Duration::from_millis(100));
            LocatePolicy::Poll(interval)
        } else {
            LocatePolicy::FailFast
        };

        Self {
            window_title: config.window.title.clone(),
            crop: config.window.crop,
            rate: config.tts.rate_value(),
            page_backoff: config.page_backoff(),
            post_advance_delay: secs(config.reading.post_advance_delay_secs),
            min_page_wait: secs(config.reading.min_page_secs),
            locate,
            await_ack: config.tts.await_ack,
            ack_grace: Duration::from_millis(config.tts.ack_grace_ms),
            debug_dir: config.ocr.debug_dir.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("Target window not found: '{0}'")]
    WindowNotFound(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadingSummary {
    pub pages_read: usize,
    pub empty_cycles: usize,
}

pub struct ReadingLoop {
    settings: ReaderSettings,
    capture: Arc<dyn WindowCapture>,
    extractor: TextExtractor,
    speaker: Arc<dyn Speaker>,
    pager: Arc<dyn PageAdvancer>,
    estimator: DurationEstimator,
    page_log: Option<PageLog>,
    status: watch::Sender<Status>,
    state: ReaderState,
    pages_captured: usize,
    speech_disabled_noted: bool,
}

impl ReadingLoop {
    pub fn new(
        settings: ReaderSettings,
        capture: Arc<dyn WindowCapture>,
        extractor: TextExtractor,
        speaker: Arc<dyn Speaker>,
        pager: Arc<dyn PageAdvancer>,
        estimator: DurationEstimator,
    ) -> Self {
        let (status, _) = watch::channel(Status::Stopped);
        Self {
            settings,
            capture,
            extractor,
            speaker,
            pager,
            estimator,
            page_log: None,
            status,
            state: ReaderState::Stopped,
            pages_captured: 0,
            speech_disabled_noted: false,
        }
    }

    pub fn with_page_log(mut self, log: PageLog) -> Self {
        self.page_log = Some(log);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    fn transition(&mut self, next: ReaderState) {
        if self.state != next {
            info!("State: {} → {}", self.state, next);
            self.state = next;
        }
    }

    fn publish(&self, status: Status) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Read pages until cancelled.
    ///
    /// Only a missing window (under [`LocatePolicy::FailFast`]) ends the
    /// session early. Every other failure costs one cycle at most.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<ReadingSummary, ReaderError> {
        let mut summary = ReadingSummary::default();
        let mut handle: Option<WindowHandle> = None;

        self.publish(Status::Running);
        info!(
            "Reading '{}' at rate {} (backoff {:?})",
            self.settings.window_title, self.settings.rate, self.settings.page_backoff
        );

        loop {
            if cancel.is_cancelled() {
                info!("Stop requested");
                break;
            }

            let target = match handle {
                Some(h) => h,
                None => match self.locate(&cancel).await {
                    Ok(Some(h)) => {
                        handle = Some(h);
                        h
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.transition(ReaderState::Stopped);
                        self.publish(Status::Error(e.to_string()));
                        return Err(e);
                    }
                },
            };

            self.transition(ReaderState::Reading);

            let page = match self.capture_page(target).await {
                Ok(page) => page,
                Err(WindowError::Gone(h)) => {
                    warn!("Window {h} went away, locating again");
                    handle = None;
                    continue;
                }
                Err(e) => {
                    warn!("{e}");
                    self.backoff().await;
                    continue;
                }
            };

            self.save_debug_page(&page);

            let text = self.extractor.extract(page).await;
            if text.is_empty() {
                debug!("No text on page, backing off");
                summary.empty_cycles += 1;
                self.backoff().await;
                continue;
            }

            self.read_page(target, &text).await;
            summary.pages_read += 1;
        }

        self.transition(ReaderState::Stopped);
        self.publish(Status::Stopped);
        info!(
            "Read {} pages ({} empty cycles)",
            summary.pages_read, summary.empty_cycles
        );
        Ok(summary)
    }

    /// `Ok(None)` means cancellation arrived while waiting for the window.
    async fn locate(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<WindowHandle>, ReaderError> {
        self.transition(ReaderState::Locating);
        let title = self.settings.window_title.clone();

        loop {
            match self.capture.find_target_window(&title) {
                Ok(handle) => {
                    info!("Target window {handle} found");
                    self.publish(Status::Running);
                    return Ok(Some(handle));
                }
                Err(e) => match self.settings.locate {
                    LocatePolicy::FailFast => {
                        warn!("{e}");
                        return Err(ReaderError::WindowNotFound(title));
                    }
                    LocatePolicy::Poll(interval) => {
                        debug!("{e}, retrying in {interval:?}");
                        self.publish(Status::Locating);
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(None),
                            _ = tokio::time::sleep(interval) => {}
                        }
                    }
                },
            }
        }
    }

    async fn capture_page(&self, handle: WindowHandle) -> Result<Page, WindowError> {
        let capture = self.capture.clone();
        let crop = self.settings.crop;
        tokio::task::spawn_blocking(move || capture.capture_client_area(handle, crop))
            .await
            .map_err(|e| WindowError::Capture(format!("Capture task failed: {e}")))?
    }

    async fn read_page(&mut self, handle: WindowHandle, text: &str) {
        info!("Page ({} words): {}", word_count(text), preview(text, 80));
        debug!("Page text: {text}");

        let estimate = self.estimator.estimate(text, self.settings.rate);
        let ack_within = self
            .settings
            .await_ack
            .then(|| estimate + self.settings.ack_grace);

        let started = Instant::now();
        let delivery = match self.speaker.speak(text, ack_within).await {
            Ok(delivery) => delivery,
            Err(SpeechError::Disabled) => {
                if !self.speech_disabled_noted {
                    info!("Speech output disabled, pacing pages by estimate only");
                    self.speech_disabled_noted = true;
                }
                Delivery::Sent
            }
            Err(e) => {
                warn!("Speech delivery failed: {e}");
                Delivery::Sent
            }
        };

        let wait = match delivery {
            Delivery::Sent => estimate,
            Delivery::Acknowledged => Duration::ZERO,
            Delivery::Unacknowledged => estimate.saturating_sub(started.elapsed()),
        };
        let wait = wait.max(self.settings.min_page_wait.saturating_sub(started.elapsed()));
        debug!("Speech {delivery:?}, estimated {estimate:?}, waiting {wait:?}");

        if let Some(log) = &self.page_log {
            log.save(&PageRecord::new(
                &self.settings.window_title,
                text,
                estimate.as_secs_f64(),
            ));
        }

        tokio::time::sleep(wait).await;
        self.pager.advance(handle);
        tokio::time::sleep(self.settings.post_advance_delay).await;
    }

    async fn backoff(&mut self) {
        self.transition(ReaderState::Backoff);
        tokio::time::sleep(self.settings.page_backoff).await;
    }

    fn save_debug_page(&mut self, page: &Page) {
        let (x, y, w, h) = page.rect;
        debug!("Captured {w}x{h} page at ({x}, {y})");

        let Some(dir) = &self.settings.debug_dir else {
            return;
        };
        self.pages_captured += 1;

        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Failed to create debug dir: {e}");
            return;
        }
        let path = dir.join(format!("page-{:05}.png", self.pages_captured));
        match page.image.save(&path) {
            Ok(()) => debug!("Saved page capture to {}", path.display()),
            Err(e) => warn!("Failed to save page capture: {e}"),
        }
    }
}
