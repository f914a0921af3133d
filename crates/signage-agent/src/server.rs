//! HTTP client for the schedule authority.
//!
//! Every call here is a plain request/response exchange; the
//! reconciliation loop decides what a failure means (usually: keep the
//! previous answer and try again next cycle).

use signage_core::api::{
    DeviceAuth, DownloadStatusReport, FetchSchedulesResponse, PlaybackReport, PlaybackState,
    ScheduleWindow, VideoRef,
};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("device token rejected by the server")]
    InvalidToken,
    #[error("no default video configured on the server")]
    NoDefaultVideo,
    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),
}

pub struct ScheduleClient {
    base_url: String,
    device_token: String,
    client: reqwest::Client,
}

impl ScheduleClient {
    pub fn new(base_url: &str, device_token: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            device_token: device_token.to_string(),
            client,
        })
    }

    /// Pull the schedule windows for this device. The server bounds the
    /// result to its forward horizon (next 12 hours), ordered by start time.
    pub async fn fetch_schedules(&self) -> Result<Vec<ScheduleWindow>, FetchError> {
        let url = format!("{}/api/devices/fetch-schedules", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&DeviceAuth {
                device_token: &self.device_token,
            })
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => {
                let body: FetchSchedulesResponse = resp.json().await?;
                debug!(count = body.schedules.len(), "fetched schedules");
                Ok(body.schedules)
            }
            reqwest::StatusCode::UNAUTHORIZED => Err(FetchError::InvalidToken),
            s => Err(FetchError::Status(s)),
        }
    }

    /// The video every device falls back to when no window is active.
    pub async fn default_video(&self) -> Result<VideoRef, FetchError> {
        let url = format!("{}/api/videos/default-video", self.base_url);
        let resp = self.client.get(&url).send().await?;

        match resp.status() {
            s if s.is_success() => Ok(resp.json().await?),
            reqwest::StatusCode::NOT_FOUND => Err(FetchError::NoDefaultVideo),
            s => Err(FetchError::Status(s)),
        }
    }

    /// Tell the server a video finished downloading. Best-effort.
    pub async fn report_download(
        &self,
        video_id: i64,
        schedule_group_id: &str,
    ) -> Result<(), FetchError> {
        let url = format!("{}/api/devices/update-download-status", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&DownloadStatusReport {
                device_token: &self.device_token,
                video_id,
                schedule_group_id,
            })
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::UNAUTHORIZED => Err(FetchError::InvalidToken),
            s => Err(FetchError::Status(s)),
        }
    }

    /// Report what is on screen right now. Best-effort; the loop logs and
    /// moves on when this fails.
    pub async fn report_playback(
        &self,
        video_id: Option<i64>,
        playback_state: PlaybackState,
    ) -> Result<(), FetchError> {
        let url = format!("{}/api/devices/update-playback", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&PlaybackReport {
                device_token: &self.device_token,
                video_id,
                playback_state,
            })
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::UNAUTHORIZED => Err(FetchError::InvalidToken),
            s => Err(FetchError::Status(s)),
        }
    }
}
