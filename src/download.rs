//! Sequential downloader that skips files already on disk.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::{Client, Response};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::error::{ensure_success, PhotosError, Result};
use crate::models::{format_size, MediaRef};

/// What happened to a single media reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A file with the same name was already in the folder.
    Skipped,
    Downloaded { bytes: u64 },
}

/// Totals for a batch of downloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl std::fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} downloaded ({}), {} skipped, {} failed",
            self.downloaded,
            format_size(self.bytes),
            self.skipped,
            self.failed
        )
    }
}

/// Fetches media bytes into a local folder.
pub struct Downloader {
    auth: Authenticator,
    http: Client,
}

impl Downloader {
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth,
            http: Client::new(),
        }
    }

    /// Download one item into `folder` unless a file of that name exists.
    ///
    /// Bytes are streamed into a hidden `.part` file that is renamed into
    /// place only once complete, so an interrupted run never leaves a file
    /// that a later run would mistake for a finished download.
    pub async fn download(&self, media: &MediaRef, folder: &Path) -> Result<DownloadOutcome> {
        let name = media.local_file_name()?;
        let final_path = folder.join(&name);

        if fs::try_exists(&final_path).await? {
            debug!(path = %final_path.display(), "file exists");
            return Ok(DownloadOutcome::Skipped);
        }

        let token = self.auth.get_access_token().await?;
        let response = self
            .http
            .get(media.download_url())
            .bearer_auth(&token)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let part_path = partial_path(folder, &name);
        let result = async {
            let bytes = stream_to_file(response, &part_path).await?;
            fs::rename(&part_path, &final_path).await?;
            Ok::<_, PhotosError>(bytes)
        }
        .await;

        match result {
            Ok(bytes) => Ok(DownloadOutcome::Downloaded { bytes }),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&part_path).await {
                    debug!(path = %part_path.display(), error = %cleanup, "no partial file to remove");
                }
                Err(e)
            }
        }
    }

    /// Download every item in order. Failures are logged and counted; they
    /// do not stop the batch.
    pub async fn download_all(&self, items: &[MediaRef], folder: &Path) -> DownloadSummary {
        let mut summary = DownloadSummary::default();
        let total = items.len();

        for (idx, media) in items.iter().enumerate() {
            let progress = format!("{}/{}", idx + 1, total);
            match self.download(media, folder).await {
                Ok(DownloadOutcome::Skipped) => {
                    summary.skipped += 1;
                    info!(%progress, file = %media.filename, "already exists, skipping");
                }
                Ok(DownloadOutcome::Downloaded { bytes }) => {
                    summary.downloaded += 1;
                    summary.bytes += bytes;
                    info!(%progress, file = %media.filename, size = %format_size(bytes), "downloaded");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(%progress, file = %media.filename, error = %e, "download failed");
                }
            }
        }

        summary
    }
}

fn partial_path(folder: &Path, name: &str) -> PathBuf {
    folder.join(format!(".{}.part", name))
}

async fn stream_to_file(response: Response, path: &Path) -> Result<u64> {
    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
