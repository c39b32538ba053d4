use std::io;
use std::path::{Path, PathBuf};

use pusher_log::LogError;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

async fn write_private(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(body).await?;
    file.flush().await
}

/// The diagnostic dump file receiving the body of the last failed push.
///
/// Writes are serialized, so the file always holds exactly one batch even when pushes to
/// several destinations fail at the same time.
#[derive(Debug)]
pub struct DumpFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DumpFile {
    /// Creates a dump file at `path`. Nothing is written until the first failure.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the path of the dump file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the contents of the dump file with `body`.
    ///
    /// The file is only readable by the owner. Failures to write are logged and otherwise
    /// ignored.
    pub async fn dump(&self, body: &[u8]) {
        let _guard = self.lock.lock().await;
        match write_private(&self.path, body).await {
            Ok(()) => pusher_log::debug!(path = %self.path.display(), "dumped failed batch"),
            Err(error) => pusher_log::error!(
                path = %self.path.display(),
                "could not dump failed batch: {}",
                LogError(&error)
            ),
        }
    }
}
