//! Wire types for the schedule authority's device API.
//!
//! Everything here is fetched read-only and superseded wholesale on each
//! fetch — the device never patches a schedule locally. Timestamps arrive
//! as naive ISO 8601 strings and are interpreted in the device's
//! configured UTC offset (see [`crate::config::AgentConfig::utc_offset_minutes`]).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single video as the server describes it.
///
/// Identity is `video_id` — the download URL may rotate (presigned links),
/// so local caching keys on the id, never the URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoRef {
    pub video_id: i64,
    pub title: String,
    pub video_link: String,
}

/// A time-bounded assignment of an ordered video list to this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub schedule_id: i64,
    pub schedule_group_id: String,
    pub start_time: NaiveDateTime,
    /// `None` means open until further notice; the server already bounds
    /// the fetch to a forward horizon, so this is not treated as infinite.
    pub end_time: Option<NaiveDateTime>,
    pub videos: Vec<VideoRef>,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default = "default_play_mode")]
    pub play_mode: String,
}

fn default_play_mode() -> String {
    "loop".to_string()
}

impl ScheduleWindow {
    /// True when `now` falls inside this window.
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        if self.start_time > now {
            return false;
        }
        match self.end_time {
            Some(end) => now <= end,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchSchedulesResponse {
    #[serde(default)]
    pub schedules: Vec<ScheduleWindow>,
}

/// Request body shared by the token-authenticated device endpoints.
#[derive(Debug, Serialize)]
pub struct DeviceAuth<'a> {
    pub device_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DownloadStatusReport<'a> {
    pub device_token: &'a str,
    pub video_id: i64,
    pub schedule_group_id: &'a str,
}

/// Playback state vocabulary as stored on the server's device record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Serialize)]
pub struct PlaybackReport<'a> {
    pub device_token: &'a str,
    pub video_id: Option<i64>,
    pub playback_state: PlaybackState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_server_schedule_payload() {
        let payload = r#"{
            "schedules": [
                {
                    "schedule_id": 7,
                    "schedule_group_id": "grp-a1",
                    "start_time": "2025-03-01T10:00:00",
                    "end_time": null,
                    "videos": [
                        { "video_id": 12, "title": "Spring Promo", "video_link": "https://cdn.example/12" }
                    ]
                }
            ]
        }"#;

        let resp: FetchSchedulesResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(resp.schedules.len(), 1);
        let w = &resp.schedules[0];
        assert_eq!(w.schedule_group_id, "grp-a1");
        assert!(w.end_time.is_none());
        assert_eq!(w.play_mode, "loop");
        assert_eq!(w.videos[0].video_id, 12);
    }

    #[test]
    fn window_containment_with_open_end() {
        let w: ScheduleWindow = serde_json::from_str(
            r#"{
                "schedule_id": 1,
                "schedule_group_id": "g",
                "start_time": "2025-03-01T10:00:00",
                "end_time": null,
                "videos": []
            }"#,
        )
        .unwrap();

        let before = "2025-03-01T09:59:59".parse::<NaiveDateTime>().unwrap();
        let after = "2025-06-01T00:00:00".parse::<NaiveDateTime>().unwrap();
        assert!(!w.contains(before));
        assert!(w.contains(after));
    }

    #[test]
    fn playback_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PlaybackState::Playing).unwrap(),
            "\"playing\""
        );
        assert_eq!(
            serde_json::from_str::<PlaybackState>("\"stopped\"").unwrap(),
            PlaybackState::Stopped
        );
    }
}
