//! Playback drivers.
//!
//! Two ways to drive VLC, behind one interface:
//!
//! - [`ProcessPlayer`] spawns a fresh player process per playlist change.
//!   Spawning implicitly terminates the previous playback. Works anywhere,
//!   but switching shows a black frame.
//! - [`RcPlayer`] starts one long-lived VLC with the `rc` interface on a
//!   loopback TCP port and mutates the playlist over that channel. No
//!   process restart, no flicker. Preferred when available.
//!
//! Neither variant deduplicates playlists — `load_and_play` always
//! replaces what is playing. The reconciliation loop owns the "is this
//! already playing" check.

mod process;
mod rc;

pub use process::ProcessPlayer;
pub use rc::RcPlayer;

use signage_core::api::PlaybackState;
use signage_core::config::{PlayerConfig, PlayerMode};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("player binary not found (set VLC_PATH or install vlc)")]
    BinaryNotFound,
    #[error("failed to spawn player: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("control channel io: {0}")]
    Io(#[from] std::io::Error),
    #[error("control channel timed out")]
    Timeout,
    #[error("control channel sent a malformed reply: {0}")]
    Malformed(String),
}

/// What the backend reports it is doing right now.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    /// Path of the item currently rendering, when known.
    pub current: Option<PathBuf>,
    pub state: PlaybackState,
}

pub enum PlayerDriver {
    Process(ProcessPlayer),
    Remote(RcPlayer),
}

impl PlayerDriver {
    /// Build the driver selected by config. The remote-control variant
    /// spawns its player process immediately so the control channel is
    /// open before the first playlist arrives.
    pub async fn start(config: &PlayerConfig) -> Result<Self, PlayerError> {
        let binary = signage_core::platform::find_vlc_binary().ok_or(PlayerError::BinaryNotFound)?;
        match config.mode {
            PlayerMode::Process => Ok(Self::Process(ProcessPlayer::new(binary, config.fullscreen))),
            PlayerMode::RemoteControl => {
                let player = RcPlayer::start(
                    binary,
                    config.fullscreen,
                    config.rc_port,
                    std::time::Duration::from_secs(config.control_timeout_secs),
                )
                .await?;
                Ok(Self::Remote(player))
            }
        }
    }

    /// Replace whatever is playing with `playlist`. Unconditional.
    pub async fn load_and_play(
        &mut self,
        playlist: &[PathBuf],
        loop_playback: bool,
    ) -> Result<(), PlayerError> {
        match self {
            Self::Process(p) => p.load_and_play(playlist, loop_playback).await,
            Self::Remote(p) => p.load_and_play(playlist, loop_playback).await,
        }
    }

    /// Ask the backend what is rendering. Errors here downgrade the
    /// caller's knowledge to "unknown" for one cycle; they are never fatal.
    pub async fn query_status(&mut self) -> Result<PlayerStatus, PlayerError> {
        match self {
            Self::Process(p) => Ok(p.query_status()),
            Self::Remote(p) => p.query_status().await,
        }
    }

    pub async fn shutdown(&mut self) {
        match self {
            Self::Process(p) => p.shutdown().await,
            Self::Remote(p) => p.shutdown().await,
        }
    }
}
