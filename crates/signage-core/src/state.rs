use crate::api::PlaybackState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where the playlist currently on screen came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActiveSource {
    Default,
    Schedule { group_id: String },
}

/// Snapshot of what the agent is doing, for the local status endpoint.
/// `rev` is a monotonically increasing counter incremented on every
/// change, so readers can detect staleness.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentState {
    #[serde(default)]
    pub rev: u64,
    pub schedule_count: usize,
    pub active_source: Option<ActiveSource>,
    pub now_playing: Option<i64>,
    pub playback_state: Option<PlaybackState>,
    pub downloads_pending: usize,
    pub downloads_failed: usize,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_fetch_error: Option<String>,
}

/// Shared, read-mostly view of the agent. The reconciliation loop is the
/// only writer; the status endpoint and tests read it.
#[derive(Clone)]
pub struct StateManager {
    state: Arc<RwLock<AgentState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(AgentState {
                rev: 1,
                ..AgentState::default()
            })),
        }
    }

    pub fn arc(&self) -> Arc<RwLock<AgentState>> {
        Arc::clone(&self.state)
    }

    pub async fn get_state(&self) -> AgentState {
        self.state.read().await.clone()
    }

    pub async fn set_fetch_ok(&self, schedule_count: usize) {
        let mut state = self.state.write().await;
        state.schedule_count = schedule_count;
        state.last_fetch_at = Some(Utc::now());
        state.last_fetch_error = None;
        state.rev += 1;
    }

    pub async fn set_fetch_error(&self, message: String) {
        let mut state = self.state.write().await;
        state.last_fetch_error = Some(message);
        state.rev += 1;
    }

    pub async fn set_active(&self, source: ActiveSource) {
        let mut state = self.state.write().await;
        state.active_source = Some(source);
        state.rev += 1;
    }

    pub async fn set_playback(&self, video_id: Option<i64>, playback: Option<PlaybackState>) {
        let mut state = self.state.write().await;
        state.now_playing = video_id;
        state.playback_state = playback;
        state.rev += 1;
    }

    pub async fn set_downloads(&self, pending: usize, failed: usize) {
        let mut state = self.state.write().await;
        state.downloads_pending = pending;
        state.downloads_failed = failed;
        state.rev += 1;
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rev_increments_on_every_change() {
        let sm = StateManager::new();
        let r0 = sm.get_state().await.rev;
        sm.set_fetch_ok(3).await;
        sm.set_active(ActiveSource::Default).await;
        let state = sm.get_state().await;
        assert_eq!(state.rev, r0 + 2);
        assert_eq!(state.schedule_count, 3);
        assert_eq!(state.active_source, Some(ActiveSource::Default));
    }

    #[tokio::test]
    async fn fetch_error_is_cleared_on_success() {
        let sm = StateManager::new();
        sm.set_fetch_error("connection refused".into()).await;
        assert!(sm.get_state().await.last_fetch_error.is_some());
        sm.set_fetch_ok(0).await;
        assert!(sm.get_state().await.last_fetch_error.is_none());
    }
}
