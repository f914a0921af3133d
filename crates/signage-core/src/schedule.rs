//! Pure schedule resolution.
//!
//! Given the device's current local time and the most recently fetched
//! windows, pick the single window that should be on screen right now.
//! No I/O happens here, so the policy is independently testable.

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};

use crate::api::ScheduleWindow;

/// Current time in the device's fixed UTC offset, as a naive timestamp
/// directly comparable with the server's schedule timestamps. An
/// out-of-range offset falls back to UTC.
pub fn device_now(utc_offset_minutes: i32) -> NaiveDateTime {
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset).naive_local()
}

/// Resolve the active window at `now`.
///
/// Windows are evaluated in ascending `start_time` order and the first
/// match wins. Equal start times keep their source order (stable sort).
/// Earliest-start-first is the chosen precedence among overlapping
/// windows — not last-write-wins. Windows with no videos are skipped:
/// they cannot produce a playlist.
pub fn resolve<'a>(
    now: NaiveDateTime,
    windows: &'a [ScheduleWindow],
) -> Option<&'a ScheduleWindow> {
    let mut ordered: Vec<&ScheduleWindow> = windows.iter().collect();
    ordered.sort_by_key(|w| w.start_time);

    ordered
        .into_iter()
        .find(|w| !w.videos.is_empty() && w.contains(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::VideoRef;

    fn t(s: &str) -> NaiveDateTime {
        s.parse().unwrap()
    }

    fn video(id: i64) -> VideoRef {
        VideoRef {
            video_id: id,
            title: format!("video {}", id),
            video_link: format!("https://cdn.example/{}", id),
        }
    }

    fn window(
        id: i64,
        group: &str,
        start: &str,
        end: Option<&str>,
        videos: Vec<VideoRef>,
    ) -> ScheduleWindow {
        ScheduleWindow {
            schedule_id: id,
            schedule_group_id: group.to_string(),
            start_time: t(start),
            end_time: end.map(t),
            videos,
            repeat: false,
            play_mode: "loop".to_string(),
        }
    }

    #[test]
    fn no_windows_resolves_to_none() {
        assert!(resolve(t("2025-03-01T10:00:00"), &[]).is_none());
    }

    #[test]
    fn all_windows_outside_now_resolves_to_none() {
        let windows = vec![
            window(1, "a", "2025-03-01T08:00:00", Some("2025-03-01T09:00:00"), vec![video(1)]),
            window(2, "b", "2025-03-01T12:00:00", Some("2025-03-01T13:00:00"), vec![video(2)]),
        ];
        assert!(resolve(t("2025-03-01T10:00:00"), &windows).is_none());
    }

    #[test]
    fn earliest_start_wins_on_overlap() {
        // W1 10:00-11:00 and W2 10:30-11:30; at 10:45 W1 is active.
        let windows = vec![
            window(2, "w2", "2025-03-01T10:30:00", Some("2025-03-01T11:30:00"), vec![video(2)]),
            window(1, "w1", "2025-03-01T10:00:00", Some("2025-03-01T11:00:00"), vec![video(1)]),
        ];
        let hit = resolve(t("2025-03-01T10:45:00"), &windows).unwrap();
        assert_eq!(hit.schedule_group_id, "w1");

        // After W1 ends, W2 takes over.
        let hit = resolve(t("2025-03-01T11:10:00"), &windows).unwrap();
        assert_eq!(hit.schedule_group_id, "w2");
    }

    #[test]
    fn equal_start_times_preserve_source_order() {
        let windows = vec![
            window(1, "first", "2025-03-01T10:00:00", None, vec![video(1)]),
            window(2, "second", "2025-03-01T10:00:00", None, vec![video(2)]),
        ];
        let hit = resolve(t("2025-03-01T10:05:00"), &windows).unwrap();
        assert_eq!(hit.schedule_group_id, "first");
    }

    #[test]
    fn open_ended_window_stays_active() {
        let windows = vec![window(1, "open", "2025-03-01T10:00:00", None, vec![video(1)])];
        assert!(resolve(t("2025-09-01T00:00:00"), &windows).is_some());
        assert!(resolve(t("2025-03-01T09:59:59"), &windows).is_none());
    }

    #[test]
    fn empty_playlist_windows_are_skipped() {
        let windows = vec![
            window(1, "empty", "2025-03-01T09:00:00", None, vec![]),
            window(2, "full", "2025-03-01T10:00:00", None, vec![video(2)]),
        ];
        let hit = resolve(t("2025-03-01T10:30:00"), &windows).unwrap();
        assert_eq!(hit.schedule_group_id, "full");
    }

    #[test]
    fn resolution_is_deterministic() {
        let windows = vec![
            window(1, "a", "2025-03-01T10:00:00", Some("2025-03-01T11:00:00"), vec![video(1)]),
            window(2, "b", "2025-03-01T10:30:00", None, vec![video(2)]),
        ];
        let now = t("2025-03-01T10:45:00");
        let first = resolve(now, &windows).map(|w| w.schedule_id);
        for _ in 0..10 {
            assert_eq!(resolve(now, &windows).map(|w| w.schedule_id), first);
        }
    }
}
