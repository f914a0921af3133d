//! The reconciliation loop.
//!
//! One task owns all playback decisions: it fetches schedule windows on a
//! coarse interval, prefetches their media in the background, resolves
//! what should be on screen every poll tick, and only touches the player
//! when the resolved playlist actually differs from what was last
//! applied. Recoverable errors (fetch, download, control channel) are
//! logged and retried next cycle; the loop itself never dies on them.

use chrono::NaiveDateTime;
use signage_core::api::{PlaybackState, ScheduleWindow, VideoRef};
use signage_core::config::Config;
use signage_core::schedule;
use signage_core::state::{ActiveSource, StateManager};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::player::PlayerDriver;
use crate::server::ScheduleClient;
use crate::store::ContentStore;

/// The playlist last handed to the player. Owned exclusively by the
/// loop; comparing against it is the idempotence check that prevents
/// needless restarts (and the visible flicker they cause).
#[derive(Debug, Clone, PartialEq)]
pub struct ActivePlayback {
    pub source: ActiveSource,
    pub video_ids: Vec<i64>,
    pub loop_playback: bool,
    pub paths: Vec<PathBuf>,
    pub applied_at: NaiveDateTime,
}

/// Outcome of resolving the current time against the fetched windows.
#[derive(Debug, Clone, PartialEq)]
pub enum Desired {
    /// A window is active but its media is not fully local yet, and
    /// something is already on screen. Leave it untouched; prefetch is
    /// already in flight.
    Keep,
    Playlist {
        source: ActiveSource,
        video_ids: Vec<i64>,
        paths: Vec<PathBuf>,
        loop_playback: bool,
    },
}

fn window_loops(window: &ScheduleWindow) -> bool {
    window.repeat || window.play_mode != "once"
}

fn default_playlist(default_video: &VideoRef, default_path: &Path) -> Desired {
    Desired::Playlist {
        source: ActiveSource::Default,
        video_ids: vec![default_video.video_id],
        paths: vec![default_path.to_path_buf()],
        loop_playback: true,
    }
}

/// Pure planning step: what should be on screen at `now`?
///
/// `local` maps a video to its on-disk path when (and only when) the file
/// is fully materialized. `have_active` says whether any playlist has
/// been handed to the player yet: a window whose media is still
/// downloading keeps the current content when there is some, but on a
/// cold start it must not leave the screen blank — the default video is
/// guaranteed local by then, so plan that instead.
pub fn plan<F>(
    now: NaiveDateTime,
    windows: &[ScheduleWindow],
    default_video: &VideoRef,
    default_path: &Path,
    have_active: bool,
    local: F,
) -> Desired
where
    F: Fn(&VideoRef) -> Option<PathBuf>,
{
    if let Some(window) = schedule::resolve(now, windows) {
        let mut paths = Vec::with_capacity(window.videos.len());
        for video in &window.videos {
            match local(video) {
                Some(p) => paths.push(p),
                None => {
                    return if have_active {
                        Desired::Keep
                    } else {
                        default_playlist(default_video, default_path)
                    };
                }
            }
        }
        return Desired::Playlist {
            source: ActiveSource::Schedule {
                group_id: window.schedule_group_id.clone(),
            },
            video_ids: window.videos.iter().map(|v| v.video_id).collect(),
            paths,
            loop_playback: window_loops(window),
        };
    }

    default_playlist(default_video, default_path)
}

/// The no-flicker check: true only when the desired playlist differs from
/// what was last applied, by video-id sequence and loop mode.
pub fn needs_apply(
    active: Option<&ActivePlayback>,
    source: &ActiveSource,
    video_ids: &[i64],
    loop_playback: bool,
) -> bool {
    match active {
        Some(a) => {
            a.source != *source || a.video_ids != video_ids || a.loop_playback != loop_playback
        }
        None => true,
    }
}

pub struct AgentCore {
    config: Config,
    client: ScheduleClient,
    store: ContentStore,
    player: PlayerDriver,
    state: StateManager,
    windows: Vec<ScheduleWindow>,
    default_video: VideoRef,
    default_path: PathBuf,
    active: Option<ActivePlayback>,
    /// Reverse lookup from on-disk path to video_id, for status reports.
    path_index: HashMap<PathBuf, i64>,
}

impl AgentCore {
    /// Build the agent. A missing default video or unusable player here is
    /// fatal: without them the loop cannot guarantee any content on screen.
    pub async fn new(config: Config, state: StateManager) -> anyhow::Result<Self> {
        let client = ScheduleClient::new(&config.server.backend_url, &config.server.device_token)?;
        let store = ContentStore::new(
            config.paths.media_dir.clone(),
            config.agent.max_concurrent_downloads,
        )?;

        let default_video = client
            .default_video()
            .await
            .map_err(|e| anyhow::anyhow!("cannot start without a default video: {}", e))?;
        let default_path = store
            .ensure_local(&default_video)
            .await
            .map_err(|e| anyhow::anyhow!("default video download failed: {}", e))?;
        info!(
            video_id = default_video.video_id,
            path = %default_path.display(),
            "default video ready"
        );

        let player = PlayerDriver::start(&config.player)
            .await
            .map_err(|e| anyhow::anyhow!("player startup failed: {}", e))?;

        let mut path_index = HashMap::new();
        path_index.insert(default_path.clone(), default_video.video_id);

        Ok(Self {
            config,
            client,
            store,
            player,
            state,
            windows: Vec::new(),
            default_video,
            default_path,
            active: None,
            path_index,
        })
    }

    pub async fn run(mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut poll = tokio::time::interval(Duration::from_secs(
            self.config.agent.poll_interval_secs.max(1),
        ));
        let mut fetch = tokio::time::interval(Duration::from_secs(
            self.config.agent.fetch_interval_secs.max(1),
        ));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        fetch.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            poll_secs = self.config.agent.poll_interval_secs,
            fetch_secs = self.config.agent.fetch_interval_secs,
            "reconciliation loop running"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, stopping player");
                    self.player.shutdown().await;
                    return Ok(());
                }
                _ = fetch.tick() => self.refresh_schedules().await,
                _ = poll.tick() => self.reconcile().await,
            }
        }
    }

    /// Coarse cadence: pull windows from the authority and kick off
    /// prefetch for everything they reference. A failed fetch keeps the
    /// previous windows — stale schedules beat a blank screen.
    async fn refresh_schedules(&mut self) {
        match self.client.fetch_schedules().await {
            Ok(windows) => {
                debug!(count = windows.len(), "schedules refreshed");
                for window in &windows {
                    for video in &window.videos {
                        self.store
                            .spawn_fetch(video.clone(), window.schedule_group_id.clone());
                    }
                }
                self.state.set_fetch_ok(windows.len()).await;
                self.windows = windows;
            }
            Err(e) => {
                warn!("schedule fetch failed, keeping previous windows: {}", e);
                self.state.set_fetch_error(e.to_string()).await;
            }
        }
    }

    /// Fine cadence: one reconciliation cycle.
    async fn reconcile(&mut self) {
        // Download completions first — they may make this cycle's window
        // playable.
        for done in self.store.poll_progress() {
            debug!(video_id = done.video_id, "download completed");
            if let Err(e) = self
                .client
                .report_download(done.video_id, &done.schedule_group_id)
                .await
            {
                debug!(video_id = done.video_id, "download report failed: {}", e);
            }
        }
        let (pending, failed) = self.store.counts();
        self.state.set_downloads(pending, failed).await;

        let now = schedule::device_now(self.config.agent.utc_offset_minutes);
        let desired = plan(
            now,
            &self.windows,
            &self.default_video,
            &self.default_path,
            self.active.is_some(),
            |v| {
                let p = self.store.local_path(v);
                p.exists().then_some(p)
            },
        );

        if let Desired::Playlist {
            source,
            video_ids,
            paths,
            loop_playback,
        } = desired
        {
            if needs_apply(self.active.as_ref(), &source, &video_ids, loop_playback) {
                match self.player.load_and_play(&paths, loop_playback).await {
                    Ok(()) => {
                        info!(?source, items = paths.len(), "switched playback");
                        self.path_index.clear();
                        self.path_index
                            .insert(self.default_path.clone(), self.default_video.video_id);
                        for (path, id) in paths.iter().zip(video_ids.iter()) {
                            self.path_index.insert(path.clone(), *id);
                        }
                        self.state.set_active(source.clone()).await;
                        self.active = Some(ActivePlayback {
                            source,
                            video_ids,
                            loop_playback,
                            paths,
                            applied_at: now,
                        });
                    }
                    Err(e) => {
                        // Keep the old ActivePlayback — the display stays on
                        // the last good content and we retry next tick.
                        warn!("playlist switch failed: {}", e);
                    }
                }
            }
        }

        self.report_status().await;
    }

    /// Query the player and push a best-effort report upstream.
    async fn report_status(&mut self) {
        match self.player.query_status().await {
            Ok(status) => {
                let video_id = status
                    .current
                    .as_ref()
                    .and_then(|p| self.path_index.get(p))
                    .copied();
                self.state.set_playback(video_id, Some(status.state)).await;
                if let Err(e) = self.client.report_playback(video_id, status.state).await {
                    debug!("playback report failed: {}", e);
                }
            }
            Err(e) => {
                // Unknown for this cycle only; next tick queries again.
                debug!("player status unavailable: {}", e);
                self.state.set_playback(None, None).await;
                let _ = self
                    .client
                    .report_playback(None, PlaybackState::Stopped)
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn window(group: &str, start: &str, end: Option<&str>, ids: &[i64]) -> ScheduleWindow {
        ScheduleWindow {
            schedule_id: 1,
            schedule_group_id: group.to_string(),
            start_time: t(start),
            end_time: end.map(t),
            videos: ids.iter().map(|id| video(*id)).collect(),
            repeat: false,
            play_mode: "loop".to_string(),
        }
    }

    fn all_local(v: &VideoRef) -> Option<PathBuf> {
        Some(PathBuf::from(format!("/media/{}.mp4", v.video_id)))
    }

    fn default_pair() -> (VideoRef, PathBuf) {
        (video(1), PathBuf::from("/media/1.mp4"))
    }

    #[test]
    fn startup_with_no_windows_plans_default() {
        let (dv, dp) = default_pair();
        let desired = plan(t("2025-03-01T10:00:00"), &[], &dv, &dp, false, all_local);
        match desired {
            Desired::Playlist {
                source, video_ids, loop_playback, ..
            } => {
                assert_eq!(source, ActiveSource::Default);
                assert_eq!(video_ids, vec![1]);
                assert!(loop_playback);
            }
            other => panic!("expected default playlist, got {:?}", other),
        }
    }

    #[test]
    fn active_window_plans_its_playlist_in_order() {
        let (dv, dp) = default_pair();
        let windows = vec![window(
            "grp",
            "2025-03-01T10:00:00",
            Some("2025-03-01T11:00:00"),
            &[5, 3, 9],
        )];
        let desired = plan(t("2025-03-01T10:30:00"), &windows, &dv, &dp, false, all_local);
        match desired {
            Desired::Playlist { source, video_ids, .. } => {
                assert_eq!(
                    source,
                    ActiveSource::Schedule { group_id: "grp".to_string() }
                );
                assert_eq!(video_ids, vec![5, 3, 9]);
            }
            other => panic!("expected schedule playlist, got {:?}", other),
        }
    }

    #[test]
    fn window_with_missing_media_keeps_current_playback() {
        let (dv, dp) = default_pair();
        let windows = vec![window("grp", "2025-03-01T10:00:00", None, &[5, 6])];
        // Video 6 is not yet downloaded.
        let desired = plan(t("2025-03-01T10:30:00"), &windows, &dv, &dp, true, |v| {
            (v.video_id == 5).then(|| PathBuf::from("/media/5.mp4"))
        });
        assert_eq!(desired, Desired::Keep);
    }

    #[test]
    fn cold_start_with_pending_window_media_plans_default() {
        // A window is already active when the agent boots, but its media
        // has not finished downloading. With nothing on screen yet the
        // plan must fall back to the default video, not leave the player
        // with an empty playlist.
        let (dv, dp) = default_pair();
        let windows = vec![window("grp", "2025-03-01T10:00:00", None, &[5, 6])];
        let desired = plan(t("2025-03-01T10:30:00"), &windows, &dv, &dp, false, |_| None);
        match desired {
            Desired::Playlist {
                source,
                video_ids,
                paths,
                loop_playback,
            } => {
                assert_eq!(source, ActiveSource::Default);
                assert_eq!(video_ids, vec![dv.video_id]);
                assert_eq!(paths, vec![dp.clone()]);
                assert!(loop_playback);
            }
            other => panic!("expected default fallback, got {:?}", other),
        }
    }

    #[test]
    fn expired_window_falls_back_to_default() {
        let (dv, dp) = default_pair();
        let windows = vec![window(
            "grp",
            "2025-03-01T10:00:00",
            Some("2025-03-01T11:00:00"),
            &[5],
        )];
        let desired = plan(t("2025-03-01T11:00:01"), &windows, &dv, &dp, true, all_local);
        match desired {
            Desired::Playlist { source, .. } => assert_eq!(source, ActiveSource::Default),
            other => panic!("expected default fallback, got {:?}", other),
        }
    }

    #[test]
    fn unchanged_playlist_needs_no_apply() {
        let active = ActivePlayback {
            source: ActiveSource::Schedule { group_id: "grp".to_string() },
            video_ids: vec![5, 3],
            loop_playback: true,
            paths: vec![PathBuf::from("/media/5.mp4"), PathBuf::from("/media/3.mp4")],
            applied_at: t("2025-03-01T10:00:00"),
        };
        let source = ActiveSource::Schedule { group_id: "grp".to_string() };
        assert!(!needs_apply(Some(&active), &source, &[5, 3], true));

        // Any difference forces an apply.
        assert!(needs_apply(Some(&active), &source, &[3, 5], true));
        assert!(needs_apply(Some(&active), &source, &[5, 3], false));
        assert!(needs_apply(Some(&active), &ActiveSource::Default, &[5, 3], true));
        assert!(needs_apply(None, &source, &[5, 3], true));
    }

    #[test]
    fn lifecycle_default_to_schedule_and_back() {
        let (dv, dp) = default_pair();
        let windows = vec![window(
            "campaign",
            "2025-03-01T12:00:00",
            Some("2025-03-01T13:00:00"),
            &[7],
        )];

        let source_at = |now: &str| match plan(t(now), &windows, &dv, &dp, true, all_local) {
            Desired::Playlist { source, .. } => source,
            other => panic!("unexpected plan: {:?}", other),
        };

        assert_eq!(source_at("2025-03-01T11:59:59"), ActiveSource::Default);
        assert_eq!(
            source_at("2025-03-01T12:00:00"),
            ActiveSource::Schedule { group_id: "campaign".to_string() }
        );
        assert_eq!(source_at("2025-03-01T13:00:01"), ActiveSource::Default);
    }

    #[test]
    fn play_mode_once_disables_looping() {
        let (dv, dp) = default_pair();
        let mut w = window("grp", "2025-03-01T10:00:00", None, &[5]);
        w.play_mode = "once".to_string();
        let desired = plan(t("2025-03-01T10:30:00"), &[w], &dv, &dp, false, all_local);
        match desired {
            Desired::Playlist { loop_playback, .. } => assert!(!loop_playback),
            other => panic!("unexpected plan: {:?}", other),
        }
    }
}
