//! Named-pipe channels: the well-known controller pipe and per-client reply pipes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tracing::{debug, info};

use crate::core::DispatchError;
use crate::infra::message::{Message, RECORD_LEN};
use crate::util::types::ClientPid;

use super::Outbox;

/// Pause before reopening the controller pipe after all writers left.
const REOPEN_BACKOFF: Duration = Duration::from_millis(100);

/// Longest a reply may wait for room in a client's pipe.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_millis(250);

/// Delivers records to `<dir>/<prefix><pid>`, a pipe created by the client.
///
/// A client that keeps its pipe open without reading it gets
/// `ResourceUnavailable` once the pipe is full; delivery never waits longer
/// than the configured timeout.
#[derive(Debug, Clone)]
pub struct FifoOutbox {
    dir: PathBuf,
    prefix: String,
    timeout: Duration,
}

impl FifoOutbox {
    /// Create an outbox writing into pipes under `dir`.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    /// Override the per-record delivery timeout.
    #[must_use]
    pub const fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reply pipe path for `pid`.
    #[must_use]
    pub fn path_for(&self, pid: ClientPid) -> PathBuf {
        self.dir.join(format!("{}{pid}", self.prefix))
    }
}

#[async_trait]
impl Outbox for FifoOutbox {
    async fn deliver(&self, pid: ClientPid, message: Message) -> Result<(), DispatchError> {
        let path = self.path_for(pid);
        let unavailable =
            |e: std::io::Error| DispatchError::ResourceUnavailable(format!("{}: {e}", path.display()));

        // Non-blocking open: fails with ENXIO when the client is not reading.
        let mut sender = pipe::OpenOptions::new()
            .open_sender(&path)
            .map_err(unavailable)?;
        // One record is below PIPE_BUF, so a cancelled write leaves nothing behind.
        match tokio::time::timeout(self.timeout, sender.write_all(&message.encode())).await {
            Ok(written) => written.map_err(unavailable),
            Err(_) => {
                debug!(pid, path = %path.display(), "reply pipe full, dropping record");
                Err(DispatchError::ResourceUnavailable(format!(
                    "{}: client is not reading",
                    path.display()
                )))
            }
        }
    }
}

/// The well-known pipe every client writes its requests into.
///
/// Removed from the filesystem when dropped.
#[derive(Debug)]
pub struct ControllerPipe {
    path: PathBuf,
    receiver: pipe::Receiver,
}

impl ControllerPipe {
    /// Claim the controller pipe at `path`. Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `PreconditionFailed` if another controller is already reading it
    /// - `ResourceUnavailable` if the pipe cannot be created or opened
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, DispatchError> {
        let path = path.into();

        // A writer open only succeeds if someone is reading: another instance.
        if pipe::OpenOptions::new().open_sender(&path).is_ok() {
            return Err(DispatchError::PreconditionFailed(format!(
                "another controller is already running on {}",
                path.display()
            )));
        }

        match nix::unistd::mkfifo(&path, Mode::from_bits_truncate(0o666)) {
            Ok(()) | Err(Errno::EEXIST) => {}
            Err(e) => {
                return Err(DispatchError::ResourceUnavailable(format!(
                    "mkfifo {}: {e}",
                    path.display()
                )))
            }
        }

        let receiver = Self::open(&path)?;
        info!(path = %path.display(), "controller pipe ready");
        Ok(Self { path, receiver })
    }

    /// Filesystem path of the pipe.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next complete record.
    ///
    /// End-of-stream (every writer closed) reopens the pipe instead of failing.
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnavailable` on read failures other than end-of-stream.
    pub async fn next_message(&mut self) -> Result<Message, DispatchError> {
        let mut record = [0_u8; RECORD_LEN];
        loop {
            match self.receiver.read_exact(&mut record).await {
                Ok(_) => return Message::decode(&record),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    debug!("controller pipe has no writers, reopening");
                    tokio::time::sleep(REOPEN_BACKOFF).await;
                    self.receiver = Self::open(&self.path)?;
                }
                Err(e) => {
                    return Err(DispatchError::ResourceUnavailable(format!(
                        "{}: {e}",
                        self.path.display()
                    )))
                }
            }
        }
    }

    fn open(path: &Path) -> Result<pipe::Receiver, DispatchError> {
        let mut options = pipe::OpenOptions::new();
        // Holding a write end as well keeps the pipe from reporting EOF.
        #[cfg(target_os = "linux")]
        options.read_write(true);
        options.open_receiver(path).map_err(|e| {
            DispatchError::ResourceUnavailable(format!("{}: {e}", path.display()))
        })
    }
}

impl Drop for ControllerPipe {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
