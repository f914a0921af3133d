//! Local content store.
//!
//! Media files are cached under the configured media directory with a
//! deterministic name derived from (sanitized title, video_id). A file
//! that exists at its final path is trusted and never re-downloaded;
//! transfers stream through a randomized `.part` temp file and are
//! renamed into place only on full success, so an interrupted download
//! never leaves a corrupt file where a later cycle would find it.

use futures_util::StreamExt;
use signage_core::api::VideoRef;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("truncated body: received {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    InFlight,
    Ready(PathBuf),
    Failed(String),
}

/// Completion report from a background fetch task.
#[derive(Debug, Clone)]
struct DownloadProgress {
    video_id: i64,
    schedule_group_id: String,
    status: DownloadStatus,
}

/// A download that just finished; the loop reports these upstream.
#[derive(Debug, Clone)]
pub struct CompletedDownload {
    pub video_id: i64,
    pub schedule_group_id: String,
    pub path: PathBuf,
}

pub struct ContentStore {
    media_dir: PathBuf,
    client: reqwest::Client,
    statuses: HashMap<i64, DownloadStatus>,
    progress_tx: mpsc::Sender<DownloadProgress>,
    progress_rx: mpsc::Receiver<DownloadProgress>,
    semaphore: std::sync::Arc<Semaphore>,
}

impl ContentStore {
    pub fn new(media_dir: PathBuf, max_concurrent: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&media_dir)?;
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        let (progress_tx, progress_rx) = mpsc::channel(64);
        Ok(Self {
            media_dir,
            client,
            statuses: HashMap::new(),
            progress_tx,
            progress_rx,
            semaphore: std::sync::Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Strip characters outside alnum/space/underscore, then trim trailing
    /// whitespace. Matches the naming the fleet has used since day one, so
    /// existing caches stay valid.
    pub fn sanitize_title(title: &str) -> String {
        title
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    /// Deterministic local path for a video. The unique video_id suffix
    /// makes title collisions harmless.
    pub fn local_path(&self, video: &VideoRef) -> PathBuf {
        self.media_dir
            .join(format!("{}_{}.mp4", Self::sanitize_title(&video.title), video.video_id))
    }

    /// Fetch-or-reuse. Returns immediately without network I/O when the
    /// file is already materialized.
    pub async fn ensure_local(&self, video: &VideoRef) -> Result<PathBuf, DownloadError> {
        let path = self.local_path(video);
        if path.exists() {
            return Ok(path);
        }
        info!(video_id = video.video_id, title = %video.title, "downloading");
        download_to(&self.client, &video.video_link, &path).await?;
        info!(video_id = video.video_id, path = %path.display(), "download complete");
        Ok(path)
    }

    /// Dispatch a background fetch for `video` unless one is in flight or
    /// the file is already known good. Failed entries are re-dispatched,
    /// which gives the retry-next-cycle behavior for free.
    pub fn spawn_fetch(&mut self, video: VideoRef, schedule_group_id: String) {
        match self.statuses.get(&video.video_id) {
            Some(DownloadStatus::InFlight) | Some(DownloadStatus::Ready(_)) => return,
            _ => {}
        }

        let path = self.local_path(&video);
        self.statuses.insert(video.video_id, DownloadStatus::InFlight);

        let client = self.client.clone();
        let tx = self.progress_tx.clone();
        let sem = self.semaphore.clone();
        tokio::spawn(async move {
            let _permit = match sem.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return, // store dropped during shutdown
            };
            let status = if path.exists() {
                DownloadStatus::Ready(path)
            } else {
                info!(video_id = video.video_id, title = %video.title, "prefetching");
                match download_to(&client, &video.video_link, &path).await {
                    Ok(()) => DownloadStatus::Ready(path),
                    Err(e) => {
                        warn!(video_id = video.video_id, "prefetch failed: {}", e);
                        DownloadStatus::Failed(e.to_string())
                    }
                }
            };
            let _ = tx
                .send(DownloadProgress {
                    video_id: video.video_id,
                    schedule_group_id,
                    status,
                })
                .await;
        });
    }

    /// Drain completion reports from background tasks. Non-blocking; the
    /// reconciliation loop calls this every poll tick.
    pub fn poll_progress(&mut self) -> Vec<CompletedDownload> {
        let mut completed = Vec::new();
        while let Ok(progress) = self.progress_rx.try_recv() {
            if let DownloadStatus::Ready(path) = &progress.status {
                completed.push(CompletedDownload {
                    video_id: progress.video_id,
                    schedule_group_id: progress.schedule_group_id.clone(),
                    path: path.clone(),
                });
            }
            self.statuses.insert(progress.video_id, progress.status);
        }
        completed
    }

    /// True when the file for `video` is present at its final path.
    pub fn is_ready(&self, video: &VideoRef) -> bool {
        self.local_path(video).exists()
    }

    /// (in-flight, failed) counts for the status snapshot.
    pub fn counts(&self) -> (usize, usize) {
        let pending = self
            .statuses
            .values()
            .filter(|s| matches!(s, DownloadStatus::InFlight))
            .count();
        let failed = self
            .statuses
            .values()
            .filter(|s| matches!(s, DownloadStatus::Failed(_)))
            .count();
        (pending, failed)
    }
}

/// Stream `url` into a temp file beside `final_path`, then rename into
/// place. On any failure the temp file is removed and `final_path` is
/// left untouched.
async fn download_to(
    client: &reqwest::Client,
    url: &str,
    final_path: &Path,
) -> Result<(), DownloadError> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(DownloadError::Status(resp.status()));
    }
    let expected = resp.content_length();

    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    let tmp_path =
        final_path.with_file_name(format!("{}.part-{:08x}", file_name, rand::random::<u32>()));

    let result = stream_body(resp, &tmp_path).await;

    match result {
        Ok(received) => {
            if let Some(expected) = expected {
                if received != expected {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    return Err(DownloadError::Truncated { received, expected });
                }
            }
            tokio::fs::rename(&tmp_path, final_path).await?;
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            Err(e)
        }
    }
}

async fn stream_body(resp: reqwest::Response, tmp_path: &Path) -> Result<u64, DownloadError> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    let mut stream = resp.bytes_stream();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
    }
    file.flush().await?;
    debug!(path = %tmp_path.display(), bytes = received, "body streamed");
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(
            ContentStore::sanitize_title("Spring/Promo: v2 (final)!"),
            "SpringPromo v2 final"
        );
        assert_eq!(ContentStore::sanitize_title("plain_name"), "plain_name");
        assert_eq!(ContentStore::sanitize_title("trailing   "), "trailing");
    }

    #[test]
    fn local_path_is_deterministic_and_id_suffixed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().to_path_buf(), 2).unwrap();
        let video = VideoRef {
            video_id: 42,
            title: "Summer Sale!".to_string(),
            video_link: "https://cdn.example/a".to_string(),
        };
        let p1 = store.local_path(&video);
        let p2 = store.local_path(&video);
        assert_eq!(p1, p2);
        assert!(p1.ends_with("Summer Sale_42.mp4"));

        // Same title, different id: no collision.
        let other = VideoRef {
            video_id: 43,
            title: "Summer Sale!".to_string(),
            video_link: "https://cdn.example/b".to_string(),
        };
        assert_ne!(store.local_path(&other), p1);
    }
}
