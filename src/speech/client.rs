//! TCP client for the speech server.
//!
//! Every request gets a fresh connection. Speak writes one flattened line and
//! half-closes; discovery writes `list-voices` and drains reply lines until
//! EOF or until the server goes quiet for the per-read timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{Delivery, SpeechError, Speaker, SpeechServer, VoiceCatalog};
use crate::config::TTSConfig;
use crate::text::flatten;

const LIST_VOICES: &[u8] = b"list-voices\n";

pub struct SpeechClient {
    server: Arc<SpeechServer>,
    addr: String,
    use_tcp: bool,
    catalog_path: PathBuf,
}

impl SpeechClient {
    pub fn new(config: &TTSConfig, server: Arc<SpeechServer>, catalog_path: PathBuf) -> Self {
        Self {
            server,
            addr: format!("{}:{}", config.host, config.port),
            use_tcp: config.use_tcp,
            catalog_path,
        }
    }

    async fn connect(&self) -> Result<TcpStream, SpeechError> {
        TcpStream::connect(&self.addr)
            .await
            .map_err(|source| SpeechError::Connect {
                addr: self.addr.clone(),
                source,
            })
    }

    /// Ask the server for its voices and persist the answer.
    ///
    /// Connection failures give an empty catalog and leave the saved one
    /// untouched. A completed exchange always overwrites it, even when no
    /// voices came back.
    pub async fn list_voices(&self, timeout: Duration) -> VoiceCatalog {
        if !self.use_tcp {
            debug!("TCP disabled, no voices to discover");
            return VoiceCatalog::default();
        }

        self.server.ensure_started().await;

        let lines = match self.query_voice_lines(timeout).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Voice discovery failed: {e}");
                return VoiceCatalog::default();
            }
        };

        let catalog = VoiceCatalog::from_lines(&lines);
        info!(
            "Discovered {} voices ({} lines received)",
            catalog.len(),
            lines.len()
        );

        if let Err(e) = catalog.save(&self.catalog_path) {
            warn!(
                "Failed to save voices to {}: {e}",
                self.catalog_path.display()
            );
        }
        catalog
    }

    async fn query_voice_lines(&self, timeout: Duration) -> Result<Vec<String>, SpeechError> {
        let mut stream = self.connect().await?;
        stream.write_all(LIST_VOICES).await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut lines = Vec::new();
        loop {
            let mut buf = Vec::new();
            match tokio::time::timeout(timeout, reader.read_until(b'\n', &mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(_)) => {
                    let line = String::from_utf8_lossy(&buf).trim().to_string();
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!("No voice line within {timeout:?}, keeping {} lines", lines.len());
                    break;
                }
            }
        }
        Ok(lines)
    }
}

#[async_trait]
impl Speaker for SpeechClient {
    async fn speak(
        &self,
        text: &str,
        ack_within: Option<Duration>,
    ) -> Result<Delivery, SpeechError> {
        if !self.use_tcp {
            return Err(SpeechError::Disabled);
        }

        self.server.ensure_started().await;

        let mut stream = self.connect().await?;
        let line = format!("{}\n", flatten(text));
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
        stream.shutdown().await?;
        debug!("Sent {} bytes to speech server", line.len());

        let Some(limit) = ack_within else {
            return Ok(Delivery::Sent);
        };

        let mut reader = BufReader::new(stream);
        let mut ack = Vec::new();
        match tokio::time::timeout(limit, reader.read_until(b'\n', &mut ack)).await {
            Ok(Ok(n)) if n > 0 => {
                debug!("Speech acknowledged: {}", String::from_utf8_lossy(&ack).trim());
                Ok(Delivery::Acknowledged)
            }
            Ok(Ok(_)) => Ok(Delivery::Unacknowledged),
            Ok(Err(e)) => {
                debug!("Reading acknowledgement failed: {e}");
                Ok(Delivery::Unacknowledged)
            }
            Err(_) => Ok(Delivery::Unacknowledged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn client_for(port: u16, catalog_path: PathBuf) -> SpeechClient {
        let config = TTSConfig {
            host: "127.0.0.1".into(),
            port,
            auto_start: false,
            ..TTSConfig::default()
        };
        SpeechClient::new(&config, Arc::new(SpeechServer::new(&config)), catalog_path)
    }

    #[tokio::test]
    async fn test_speak_sends_one_flattened_line() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            conn.read_to_string(&mut received).await.unwrap();
            received
        });

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(port, dir.path().join("voices.json"));
        let delivery = client.speak("Hello\nworld\r!", None).await.unwrap();

        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(server.await.unwrap(), "Hello world !\n");
    }

    #[tokio::test]
    async fn test_speak_connection_refused() {
        let (listener, port) = listener().await;
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(port, dir.path().join("voices.json"));
        let err = client.speak("text", None).await.unwrap_err();
        assert!(matches!(err, SpeechError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_speak_with_ack() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            conn.read_to_end(&mut received).await.unwrap();
            conn.write_all(b"done\n").await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(port, dir.path().join("voices.json"));
        let delivery = client
            .speak("Hello", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Acknowledged);
    }

    #[tokio::test]
    async fn test_speak_ack_times_out() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            conn.read_to_end(&mut received).await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(conn);
        });

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(port, dir.path().join("voices.json"));
        let delivery = client
            .speak("Hello", Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Unacknowledged);
    }

    #[tokio::test]
    async fn test_list_voices_until_eof() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(conn);
            let mut command = String::new();
            reader.read_line(&mut command).await.unwrap();
            let mut conn = reader.into_inner();
            conn.write_all(
                b"Voice[0]: Microsoft David - English (United States)\r\n\
                  Listing voices\n\
                  \n\
                  Voice[1]: CustomVoice\n",
            )
            .await
            .unwrap();
            command
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voices.json");
        let client = client_for(port, path.clone());
        let catalog = client.list_voices(Duration::from_secs(5)).await;

        assert_eq!(server.await.unwrap(), "list-voices\n");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.voices()[0].name, "Microsoft David");
        assert_eq!(catalog.voices()[0].locale, "English (United States)");
        assert_eq!(catalog.voices()[1].name, "CustomVoice");
        assert_eq!(VoiceCatalog::load(&path), catalog);
    }

    #[tokio::test]
    async fn test_list_voices_keeps_lines_before_idle_timeout() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"Voice[0]: Hazel - English (Great Britain)\nVoice[1]: Zira\n")
                .await
                .unwrap();
            // Stay connected without sending anything else
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(conn);
        });

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(port, dir.path().join("voices.json"));
        let catalog = client.list_voices(Duration::from_millis(150)).await;

        let names: Vec<_> = catalog.voices().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["Hazel", "Zira"]);
    }

    #[tokio::test]
    async fn test_list_voices_connection_error_keeps_saved_catalog() {
        let (listener, port) = listener().await;
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voices.json");
        let saved = VoiceCatalog::from_lines(["Voice[0]: Kept"]);
        saved.save(&path).unwrap();

        let client = client_for(port, path.clone());
        assert!(client.list_voices(Duration::from_millis(100)).await.is_empty());
        assert_eq!(VoiceCatalog::load(&path), saved);
    }

    #[tokio::test]
    async fn test_list_voices_empty_reply_overwrites_saved_catalog() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(conn);
            let mut command = String::new();
            reader.read_line(&mut command).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voices.json");
        VoiceCatalog::from_lines(["Voice[0]: Stale"])
            .save(&path)
            .unwrap();

        let client = client_for(port, path.clone());
        assert!(client.list_voices(Duration::from_secs(5)).await.is_empty());
        assert!(VoiceCatalog::load(&path).is_empty());
    }

    #[tokio::test]
    async fn test_tcp_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = TTSConfig {
            use_tcp: false,
            ..TTSConfig::default()
        };
        let client = SpeechClient::new(
            &config,
            Arc::new(SpeechServer::new(&config)),
            dir.path().join("voices.json"),
        );

        assert!(matches!(
            client.speak("hi", None).await,
            Err(SpeechError::Disabled)
        ));
        assert!(client.list_voices(Duration::from_millis(10)).await.is_empty());
        assert!(!dir.path().join("voices.json").exists());
    }
}
