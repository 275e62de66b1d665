//! TCP transport: remote install method.
//!
//! Grounded on `original_source/.../io_reader.py`'s remote-socket branch.
//! Two original drafts disagreed on whether `alive` is cleared before or
//! after a reconnect attempt; this implementation always clears it first, so
//! a reader and a writer racing on the same dead connection both see "not
//! alive" and both wait on the same reconnect rather than one of them
//! retrying a socket the other has already condemned (`DESIGN.md`,
//! Deviations).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::{PluginRuntimeError, Result};
use crate::io_server::model::{declaration_envelope, end_envelope, handshake_envelope, manifest_envelope};
use crate::io_server::transport::LineSource;
use crate::io_server::writer::RecordSink;

/// Shared connection state for a remote-install (TCP) session: both the
/// reader and the writer reconnect through this one handle so they never
/// disagree about liveness.
pub struct TcpConnection {
    host: String,
    port: u16,
    key: Option<String>,
    reconnect_attempts: u32,
    reconnect_backoff: Duration,
    alive: AtomicBool,
    reconnect_lock: Mutex<()>,
    read_half: Mutex<Option<BufReader<OwnedReadHalf>>>,
    write_half: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpConnection {
    pub fn new(host: String, port: u16, key: Option<String>, reconnect_attempts: u32, reconnect_backoff_secs: u64) -> Arc<Self> {
        Arc::new(Self {
            host,
            port,
            key,
            reconnect_attempts,
            reconnect_backoff: Duration::from_secs(reconnect_backoff_secs),
            alive: AtomicBool::new(false),
            reconnect_lock: Mutex::new(()),
            read_half: Mutex::new(None),
            write_half: Mutex::new(None),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send the outbound-first handshake envelope, then the manifest/
    /// per-category declaration sequence, closed with `end`. Asset chunks
    /// are omitted: the filesystem manifest/asset loader they come from is
    /// an external-loader concern this crate doesn't own (`SPEC_FULL.md`
    /// §1).
    async fn handshake(stream: &mut TcpStream, key: &Option<String>) -> Result<()> {
        write_envelope(stream, &handshake_envelope(key.as_deref())).await?;
        write_envelope(stream, &manifest_envelope(serde_json::json!({}))).await?;
        for category in ["tools", "models", "endpoints"] {
            write_envelope(stream, &declaration_envelope(category, serde_json::json!([]))).await?;
        }
        write_envelope(stream, &end_envelope()).await?;
        Ok(())
    }

    async fn try_connect(&self) -> Result<TcpStream> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        Self::handshake(&mut stream, &self.key).await?;
        Ok(stream)
    }

    /// Reconnect with a fixed backoff between attempts, clearing `alive`
    /// first so concurrent callers converge on the same in-progress attempt
    /// rather than racing independent dials. Gives up after
    /// `reconnect_attempts` failed attempts.
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.is_alive() {
            return Ok(());
        }
        let _guard = self.reconnect_lock.lock().await;
        if self.is_alive() {
            return Ok(());
        }

        self.alive.store(false, Ordering::SeqCst);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_connect().await {
                Ok(stream) => {
                    let (read_half, write_half) = stream.into_split();
                    *self.read_half.lock().await = Some(BufReader::new(read_half));
                    *self.write_half.lock().await = Some(write_half);
                    self.alive.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.reconnect_attempts {
                        return Err(PluginRuntimeError::Transport(format!(
                            "failed to connect to {}:{} after {attempt} attempts: {e}",
                            self.host, self.port
                        ))
                        .into());
                    }
                    tracing::warn!(attempt, error = %e, "tcp connect failed, retrying");
                }
            }
            tokio::time::sleep(self.reconnect_backoff).await;
        }
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

async fn write_envelope(stream: &mut TcpStream, value: &serde_json::Value) -> Result<()> {
    let mut line = value.to_string();
    line.push('\n');
    stream.write_all(line.as_bytes()).await?;
    Ok(())
}

/// `LineSource` half of a TCP connection.
pub struct TcpReader {
    connection: Arc<TcpConnection>,
}

impl TcpReader {
    pub fn new(connection: Arc<TcpConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl LineSource for TcpReader {
    async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            self.connection.ensure_connected().await?;
            let mut guard = self.connection.read_half.lock().await;
            let read_half = guard.as_mut().expect("connected");
            let mut buf = String::new();
            match read_half.read_line(&mut buf).await {
                Ok(0) => {
                    drop(guard);
                    self.connection.mark_dead();
                    continue;
                }
                Ok(_) => return Ok(Some(buf.trim_end_matches(['\n', '\r']).to_string())),
                Err(e) => {
                    drop(guard);
                    self.connection.mark_dead();
                    tracing::warn!(error = %e, "tcp read failed, reconnecting");
                }
            }
        }
    }
}

/// `RecordSink` half of a TCP connection.
#[derive(Debug)]
pub struct TcpTransport {
    connection: Arc<TcpConnection>,
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl TcpTransport {
    pub fn new(connection: Arc<TcpConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl RecordSink for TcpTransport {
    async fn write_record(&self, record: String) -> Result<()> {
        self.connection.ensure_connected().await?;
        let mut guard = self.connection.write_half.lock().await;
        let write_half = guard.as_mut().expect("connected");
        if let Err(e) = write_half.write_all(record.as_bytes()).await {
            drop(guard);
            self.connection.mark_dead();
            return Err(PluginRuntimeError::Transport(format!("tcp write failed: {e}")).into());
        }
        write_half.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reconnect_establishes_connection_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 512];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
        });

        let connection = TcpConnection::new("127.0.0.1".to_string(), addr.port(), None, 3, 5);
        assert!(!connection.is_alive());
        connection.ensure_connected().await.unwrap();
        assert!(connection.is_alive());
    }

    #[tokio::test]
    async fn connect_sends_handshake_then_manifest_then_declarations_then_end() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accepted = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = tokio::io::BufReader::new(socket);
            let mut lines = Vec::new();
            for _ in 0..6 {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                lines.push(line.trim_end().to_string());
            }
            lines
        });

        let connection = TcpConnection::new("127.0.0.1".to_string(), addr.port(), Some("s3cr3t".to_string()), 3, 5);
        connection.ensure_connected().await.unwrap();

        let lines = accepted.await.unwrap();
        let handshake: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(handshake["type"], "handshake");
        assert_eq!(handshake["data"]["key"], "s3cr3t");

        let manifest: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(manifest["type"], "manifest");

        assert_eq!(lines[2].contains("\"type\":\"tools\""), true);
        assert_eq!(lines[3].contains("\"type\":\"models\""), true);
        assert_eq!(lines[4].contains("\"type\":\"endpoints\""), true);

        let end: serde_json::Value = serde_json::from_str(&lines[5]).unwrap();
        assert_eq!(end["type"], "end");
    }

    #[tokio::test]
    async fn reconnect_gives_up_after_the_configured_attempt_cap() {
        // Nothing is listening on this port, so every connect attempt fails
        // immediately; a tight cap keeps the test fast.
        let connection = TcpConnection::new("127.0.0.1".to_string(), 1, None, 2, 0);
        let result = connection.ensure_connected().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("after 2 attempts"));
    }
}
