//! Page turning.
//!
//! Posts a forward key straight to the reader window by default. The enigo
//! backend synthesizes a real Right-arrow press instead, which only reaches
//! the reader when it has focus, but works with apps that ignore posted keys.

use tracing::{debug, info, warn};

use crate::config::PagerConfig;
use crate::window::{self, WindowHandle};

/// Turns the page forward in the target window. Failures are logged only.
pub trait PageAdvancer: Send + Sync {
    fn advance(&self, handle: WindowHandle);
}

pub struct PageTurner {
    backend: PagerBackend,
}

enum PagerBackend {
    Window,
    Enigo,
}

impl PageTurner {
    pub fn new(config: &PagerConfig) -> Self {
        let backend = if config.backend == "enigo" {
            PagerBackend::Enigo
        } else {
            PagerBackend::Window
        };

        info!(
            "Page turner initialized (backend: {})",
            match &backend {
                PagerBackend::Window => "window",
                PagerBackend::Enigo => "enigo",
            }
        );

        Self { backend }
    }

    fn advance_with_enigo(&self) -> Result<(), String> {
        use enigo::{Direction, Enigo, Key, Keyboard, Settings};

        let mut enigo =
            Enigo::new(&Settings::default()).map_err(|e| format!("Failed to init enigo: {e}"))?;
        enigo
            .key(Key::RightArrow, Direction::Click)
            .map_err(|e| format!("Key click failed: {e}"))?;

        debug!("Advanced via enigo key click");
        Ok(())
    }
}

impl PageAdvancer for PageTurner {
    fn advance(&self, handle: WindowHandle) {
        let result = match &self.backend {
            PagerBackend::Window => window::post_forward_key(handle),
            PagerBackend::Enigo => self.advance_with_enigo(),
        };

        match result {
            Ok(()) => debug!("Sent forward key to {handle}"),
            Err(e) => warn!("Page advance failed: {e}"),
        }
    }
}
