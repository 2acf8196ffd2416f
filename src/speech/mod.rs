//! Speech output through an external, persistent TTS server.
//!
//! The server is a separate process speaking a line-oriented protocol over
//! local TCP: one connection per request, one line of text per request,
//! `list-voices` for discovery.

pub mod client;
pub mod server;
pub mod voices;

use std::time::Duration;

use async_trait::async_trait;

pub use client::SpeechClient;
pub use server::SpeechServer;
pub use voices::VoiceCatalog;

/// What is known about a speak request once it has been handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the server, no acknowledgement requested.
    Sent,
    /// The server reported playback finished.
    Acknowledged,
    /// An acknowledgement was requested but none arrived in time.
    Unacknowledged,
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Failed to connect to speech server at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Speech server IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No speech output configured (TCP disabled)")]
    Disabled,
}

/// Sends page text to be spoken.
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Hand `text` to the speech engine. With `ack_within` set, wait up to
    /// that long for the server to report playback finished.
    async fn speak(&self, text: &str, ack_within: Option<Duration>)
        -> Result<Delivery, SpeechError>;
}
