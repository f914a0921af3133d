use super::{PlayerError, PlayerStatus};
use signage_core::api::PlaybackState;
use std::path::PathBuf;
use tracing::info;

/// Process-per-playlist driver. Spawning the replacement process kills
/// the previous one first, so at most one player is ever on screen.
pub struct ProcessPlayer {
    binary: PathBuf,
    fullscreen: bool,
    child: Option<tokio::process::Child>,
    current: Vec<PathBuf>,
}

impl ProcessPlayer {
    pub fn new(binary: PathBuf, fullscreen: bool) -> Self {
        Self {
            binary,
            fullscreen,
            child: None,
            current: Vec::new(),
        }
    }

    pub async fn load_and_play(
        &mut self,
        playlist: &[PathBuf],
        loop_playback: bool,
    ) -> Result<(), PlayerError> {
        if let Some(mut old) = self.child.take() {
            let _ = old.kill().await;
        }

        let mut cmd = tokio::process::Command::new(&self.binary);
        for path in playlist {
            cmd.arg(path);
        }
        if loop_playback {
            cmd.arg("--loop");
        }
        if self.fullscreen {
            cmd.arg("--fullscreen");
        }
        cmd.arg("--no-video-title-show")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        let child = cmd.spawn().map_err(PlayerError::Spawn)?;
        info!(items = playlist.len(), "player process spawned");

        self.child = Some(child);
        self.current = playlist.to_vec();
        Ok(())
    }

    /// This variant has no control channel; it reports what it was told
    /// to play, and whether the process is still alive. A `try_wait`
    /// error counts as stopped: better to under-report than to claim
    /// playback we cannot confirm.
    pub fn query_status(&mut self) -> PlayerStatus {
        let alive = self
            .child
            .as_mut()
            .map(|c| matches!(c.try_wait(), Ok(None)))
            .unwrap_or(false);

        if alive {
            PlayerStatus {
                current: self.current.first().cloned(),
                state: PlaybackState::Playing,
            }
        } else {
            PlayerStatus {
                current: None,
                state: PlaybackState::Stopped,
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        self.current.clear();
    }
}
