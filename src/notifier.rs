//! Desktop notifications via notify-rust (D-Bus).

use notify_rust::Notification;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::reader::Status;

pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn notify(&self, summary: &str, body: &str) {
        if !self.enabled {
            return;
        }

        debug!("Notification: {summary}");

        if let Err(e) = Notification::new()
            .summary(summary)
            .body(body)
            .icon("accessories-text-editor")
            .timeout(3000)
            .show()
        {
            warn!("Failed to show notification: {e}");
        }
    }

    /// Log every status change and mirror it as a notification, until the
    /// sending side goes away.
    pub async fn follow(self, mut status: watch::Receiver<Status>) {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            info!("Status: {current}");
            self.notify("Page Reader", &current.to_string());
        }
    }
}
