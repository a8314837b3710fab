//! The disk-backed [`Storage`] adapter.
//!
//! Writes uploads under a configured root directory (the OS temp dir
//! by default). Other adapters (object storage) must honor the same
//! two-method contract.

use polychrome::{Error, Result, Storage, UploadJob, UploadSource};

use std::path::PathBuf;
use tokio::fs;
use tokio::io::{self, AsyncRead, AsyncWriteExt};

#[derive(Debug, Clone)]
pub struct Disk {
    root: PathBuf,
}

impl Disk {
    /// A disk store rooted at the OS temp dir.
    pub fn new() -> Disk {
        Disk {
            root: std::env::temp_dir(),
        }
    }

    /// A disk store rooted at the given directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Disk {
        Disk { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl Default for Disk {
    fn default() -> Disk {
        Disk::new()
    }
}

#[async_trait::async_trait]
impl Storage for Disk {
    async fn upload(&self, source: UploadSource, destination: &str) -> Result<UploadJob> {
        if destination.is_empty() {
            return Err(Error::MissingUploadDestination);
        }

        let path = self.root.join(destination);

        Ok(UploadJob::spawn(async move {
            let mut sink = fs::File::create(&path).await?;

            match source {
                UploadSource::Path(source) => {
                    let mut file = fs::File::open(&source).await?;
                    io::copy(&mut file, &mut sink).await?;
                }
                UploadSource::Reader(mut reader) => {
                    io::copy(&mut reader, &mut sink).await?;
                }
            }

            sink.flush().await?;
            Ok(())
        }))
    }

    async fn get(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = fs::File::open(self.root.join(name)).await?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn uploads_from_bytes_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Disk::with_root(dir.path());

        let job = storage
            .upload(UploadSource::from_bytes(b"circle".to_vec()), "shape.svg")
            .await
            .unwrap();
        job.finish().await.unwrap();

        let mut reader = storage.get("shape.svg").await.unwrap();
        let mut contents = String::new();
        reader.read_to_string(&mut contents).await.unwrap();
        assert_eq!(contents, "circle");
    }

    #[tokio::test]
    async fn uploads_from_a_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.txt");
        tokio::fs::write(&source, b"payload").await.unwrap();

        let storage = Disk::with_root(dir.path());
        let job = storage
            .upload(UploadSource::Path(source), "copy.txt")
            .await
            .unwrap();
        job.finish().await.unwrap();

        let copied = tokio::fs::read(dir.path().join("copy.txt")).await.unwrap();
        assert_eq!(copied, b"payload");
    }

    #[tokio::test]
    async fn missing_destination_is_an_error() {
        let storage = Disk::new();
        let err = storage
            .upload(UploadSource::from_bytes(Vec::new()), "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingUploadDestination));
    }

    #[tokio::test]
    async fn abort_terminates_the_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Disk::with_root(dir.path());

        // A reader that never finishes while the write half is held
        // open.
        let (read_half, _write_half) = io::duplex(64);

        let job = storage
            .upload(UploadSource::Reader(Box::new(read_half)), "stalled.bin")
            .await
            .unwrap();

        job.abort();
        assert!(job.finish().await.is_err());
    }
}
