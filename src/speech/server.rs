//! Lifecycle of the speech-server child process.
//!
//! At most one launch is attempted per handle. A server that crashes later
//! is noticed through [`SpeechServer::state`] but never relaunched.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{resolve_bundled, TTSConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NoProcess,
    Launching,
    Running,
    Exited,
    LaunchFailed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::NoProcess => write!(f, "NoProcess"),
            ServerState::Launching => write!(f, "Launching"),
            ServerState::Running => write!(f, "Running"),
            ServerState::Exited => write!(f, "Exited"),
            ServerState::LaunchFailed => write!(f, "LaunchFailed"),
        }
    }
}

#[derive(Default)]
struct Slot {
    child: Option<Child>,
    launched: bool,
}

pub struct SpeechServer {
    exe_path: PathBuf,
    voice: String,
    rate: String,
    volume: String,
    addr: String,
    enabled: bool,
    ready_timeout: Duration,
    ready_poll: Duration,
    slot: AsyncMutex<Slot>,
}

impl SpeechServer {
    pub fn new(config: &TTSConfig) -> Self {
        Self {
            exe_path: resolve_bundled(&config.exe_path),
            voice: config.voice.clone(),
            rate: config.rate.clone(),
            volume: config.volume.clone(),
            addr: format!("{}:{}", config.host, config.port),
            enabled: config.use_tcp && config.auto_start,
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
            ready_poll: Duration::from_millis(config.ready_poll_ms.max(1)),
            slot: AsyncMutex::new(Slot::default()),
        }
    }

    /// Launch the server on first call, then wait until it accepts
    /// connections or the ready timeout passes. Later calls return at once.
    pub async fn ensure_started(&self) {
        if !self.enabled {
            return;
        }

        let mut slot = self.slot.lock().await;
        if slot.launched {
            return;
        }
        slot.launched = true;

        info!(
            "Starting speech server: {} --voice '{}' --rate {} --volume {}",
            self.exe_path.display(),
            self.voice,
            self.rate,
            self.volume
        );

        let spawned = Command::new(&self.exe_path)
            .args([
                "--server",
                "--voice",
                &self.voice,
                "--rate",
                &self.rate,
                "--volume",
                &self.volume,
            ])
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => {
                debug!("Speech server pid: {:?}", child.id());
                slot.child = Some(child);
                // Holding the slot keeps concurrent callers from connecting early
                self.wait_until_ready().await;
            }
            Err(e) => warn!("Failed to start speech server: {e}"),
        }
    }

    async fn wait_until_ready(&self) {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if TcpStream::connect(&self.addr).await.is_ok() {
                info!("Speech server ready at {}", self.addr);
                return;
            }
            if Instant::now() >= deadline {
                warn!(
                    "Speech server not accepting connections after {:?}, continuing anyway",
                    self.ready_timeout
                );
                return;
            }
            tokio::time::sleep(self.ready_poll).await;
        }
    }

    pub async fn state(&self) -> ServerState {
        // Only a launch in progress holds the slot for long
        let Ok(mut guard) = self.slot.try_lock() else {
            return ServerState::Launching;
        };
        let slot = &mut *guard;
        match slot.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => ServerState::Running,
                _ => ServerState::Exited,
            },
            None if slot.launched => ServerState::LaunchFailed,
            None => ServerState::NoProcess,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == ServerState::Running
    }

    /// Kill the child if one is alive. The launch attempt stays spent.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(child) = slot.child.as_mut() {
            match child.kill().await {
                Ok(()) => info!("Speech server stopped"),
                Err(e) => warn!("Failed to stop speech server: {e}"),
            }
        }
    }
}
