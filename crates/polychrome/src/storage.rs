use crate::Result;

use std::fmt::Debug;
use std::path::PathBuf;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;

/// The file-persistence boundary used by the UPLOAD handler.
///
/// The disk implementation lives in `polychrome-storage-disk`; object
/// storage adapters must honor the same two-method contract.
#[async_trait::async_trait]
pub trait Storage: Debug + Send + Sync + 'static {
    /// Begin transferring the source to `destination`, returning
    /// immediately with a running [`UploadJob`]. An empty destination
    /// is an error.
    async fn upload(&self, source: UploadSource, destination: &str) -> Result<UploadJob>;

    /// Retrieve a previously uploaded file as an async reader.
    async fn get(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// Where uploaded bytes come from: a path on the local filesystem or a
/// readable byte stream.
pub enum UploadSource {
    Path(PathBuf),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl UploadSource {
    pub fn from_bytes(bytes: Vec<u8>) -> UploadSource {
        UploadSource::Reader(Box::new(std::io::Cursor::new(bytes)))
    }
}

impl Debug for UploadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            UploadSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            UploadSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// A transfer in flight on a background task.
#[derive(Debug)]
pub struct UploadJob {
    handle: JoinHandle<Result<()>>,
}

impl UploadJob {
    /// Run the transfer future on its own task.
    pub fn spawn<F>(transfer: F) -> UploadJob
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        UploadJob {
            handle: tokio::spawn(transfer),
        }
    }

    /// Terminate the transfer. A subsequent [`finish`](Self::finish)
    /// reports the abort as an error.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the transfer to complete, propagating any transfer
    /// error.
    pub async fn finish(self) -> Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(join) => Err(crate::Error::Store(anyhow::anyhow!(
                "upload transfer aborted: {join}"
            ))),
        }
    }
}
