//! Virus scanning
//!
//! [`ClamAvScanner`] streams bytes to clamd with the `zINSTREAM` command.
//! Any failure to reach the daemon is reported as an unclean result so
//! uploads fail closed.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Bytes per `INSTREAM` chunk; well below clamd's default StreamMaxLength
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub is_clean: bool,
    pub threat_name: Option<String>,
    pub message: String,
}

impl ScanResult {
    pub fn clean(message: impl Into<String>) -> Self {
        Self {
            is_clean: true,
            threat_name: None,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>, threat_name: Option<String>) -> Self {
        Self {
            is_clean: false,
            threat_name,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait VirusScanner: Send + Sync {
    /// Scan an in-memory file. Never errors: problems come back as an
    /// unclean result.
    async fn scan(&self, bytes: &[u8], file_name: &str) -> ScanResult;

    /// Whether scans actually inspect content
    fn is_enabled(&self) -> bool;
}

/// Accepts every file. Used when scanning is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledScanner;

#[async_trait]
impl VirusScanner for DisabledScanner {
    async fn scan(&self, _bytes: &[u8], file_name: &str) -> ScanResult {
        debug!("Virus scanning disabled, accepting {}", file_name);
        ScanResult::clean("Virus scanning disabled - file not scanned")
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct ClamAvScanner {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ClamAvScanner {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    async fn instream(&self, bytes: &[u8]) -> MediaResult<String> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_all(b"zINSTREAM\0").await?;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            stream.write_all(&(chunk.len() as u32).to_be_bytes()).await?;
            stream.write_all(chunk).await?;
        }
        stream.write_all(&0u32.to_be_bytes()).await?;
        stream.flush().await?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        let reply = String::from_utf8_lossy(&reply)
            .trim_end_matches(['\0', '\n', '\r'])
            .to_string();
        if reply.is_empty() {
            return Err(MediaError::Scan("clamd closed the connection without a reply".into()));
        }
        Ok(reply)
    }
}

/// Interpret a clamd reply such as `stream: OK` or `stream: Eicar FOUND`
pub fn parse_reply(reply: &str) -> ScanResult {
    let body = reply.strip_prefix("stream:").unwrap_or(reply).trim();
    if body == "OK" {
        return ScanResult::clean("File is clean");
    }
    if let Some(threat) = body.strip_suffix("FOUND") {
        let threat = threat.trim().to_string();
        return ScanResult::rejected(format!("Threat detected: {}", threat), Some(threat));
    }
    ScanResult::rejected(format!("Virus scan failed: {}", body), None)
}

#[async_trait]
impl VirusScanner for ClamAvScanner {
    async fn scan(&self, bytes: &[u8], file_name: &str) -> ScanResult {
        info!(
            "Scanning {} ({} bytes) with ClamAV at {}:{}",
            file_name,
            bytes.len(),
            self.host,
            self.port
        );
        let outcome = match tokio::time::timeout(self.timeout, self.instream(bytes)).await {
            Ok(result) => result,
            Err(_) => Err(MediaError::Scan(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(reply) => {
                let result = parse_reply(&reply);
                if !result.is_clean {
                    warn!("File {} rejected by ClamAV: {}", file_name, reply);
                }
                result
            }
            Err(e) => {
                warn!("Error scanning file {}: {}", file_name, e);
                ScanResult::rejected(format!("Virus scan failed: {}", e), None)
            }
        }
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
