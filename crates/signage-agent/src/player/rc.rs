//! Long-lived VLC driven over its line-oriented `rc` interface.
//!
//! VLC is spawned once with `--extraintf rc --rc-host 127.0.0.1:<port>`
//! and kept running for the life of the agent. Playlist changes are
//! `clear` / `add <path>` / `loop on` commands; `status` replies are
//! parsed line by line. Every exchange carries a strict timeout so a
//! hung player costs the loop one degraded cycle, never a stall.

use super::{PlayerError, PlayerStatus};
use signage_core::api::PlaybackState;
use signage_core::platform;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

struct RcConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

pub struct RcPlayer {
    rc_port: u16,
    control_timeout: Duration,
    process: Option<tokio::process::Child>,
    conn: Option<RcConn>,
}

impl RcPlayer {
    /// Spawn VLC with the rc interface open and wait for the control
    /// channel to come up.
    pub async fn start(
        binary: PathBuf,
        fullscreen: bool,
        rc_port: u16,
        control_timeout: Duration,
    ) -> Result<Self, PlayerError> {
        let addr = platform::player_rc_address(rc_port);

        let mut cmd = tokio::process::Command::new(&binary);
        cmd.arg("--extraintf")
            .arg("rc")
            .arg("--rc-host")
            .arg(&addr)
            .arg("--no-video-title-show");
        if fullscreen {
            cmd.arg("--fullscreen");
        }
        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        info!(binary = %binary.display(), addr = %addr, "spawning player with rc interface");
        let child = cmd.spawn().map_err(PlayerError::Spawn)?;

        let mut player = Self {
            rc_port,
            control_timeout,
            process: Some(child),
            conn: None,
        };

        // The rc listener takes a moment to bind after spawn.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if player.try_connect().await {
                info!("player rc channel connected");
                return Ok(player);
            }
        }
        Err(PlayerError::Timeout)
    }

    /// Attach to an rc endpoint that is already listening, without
    /// spawning a process. Used when a supervisor owns the player, and by
    /// the integration tests.
    pub async fn connect_existing(
        rc_port: u16,
        control_timeout: Duration,
    ) -> Result<Self, PlayerError> {
        let mut player = Self {
            rc_port,
            control_timeout,
            process: None,
            conn: None,
        };
        if player.try_connect().await {
            Ok(player)
        } else {
            Err(PlayerError::Timeout)
        }
    }

    async fn try_connect(&mut self) -> bool {
        let addr = platform::player_rc_address(self.rc_port);
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                let (read_half, write_half) = stream.into_split();
                self.conn = Some(RcConn {
                    reader: BufReader::new(read_half),
                    writer: write_half,
                });
                true
            }
            Err(e) => {
                debug!("rc connect to {} failed: {}", addr, e);
                false
            }
        }
    }

    /// Take the live connection, reconnecting once if it was dropped.
    /// Callers put it back with `self.conn = Some(conn)` only after the
    /// exchange succeeded; a failed exchange leaves it dropped so the
    /// next call reconnects fresh.
    async fn take_conn(&mut self) -> Result<RcConn, PlayerError> {
        if self.conn.is_none() && !self.try_connect().await {
            return Err(PlayerError::Timeout);
        }
        self.conn.take().ok_or(PlayerError::Timeout)
    }

    /// Discard whatever the player has printed since the last exchange
    /// (banner, prompts, unsolicited playlist chatter) so the next reply
    /// parses clean.
    async fn drain(&mut self) -> Result<(), PlayerError> {
        let mut conn = self.take_conn().await?;
        loop {
            match timeout(Duration::from_millis(10), conn.reader.fill_buf()).await {
                Ok(Ok(buf)) if !buf.is_empty() => {
                    let len = buf.len();
                    conn.reader.consume(len);
                }
                Ok(Ok(_)) => {
                    // EOF — peer went away
                    return Err(PlayerError::Timeout);
                }
                Ok(Err(e)) => return Err(PlayerError::Io(e)),
                Err(_) => {
                    // nothing buffered
                    self.conn = Some(conn);
                    return Ok(());
                }
            }
        }
    }

    async fn send_line(&mut self, line: &str) -> Result<(), PlayerError> {
        let mut conn = self.take_conn().await?;
        let mut payload = line.to_string();
        payload.push('\n');
        match timeout(self.control_timeout, conn.writer.write_all(payload.as_bytes())).await {
            Ok(Ok(())) => {
                self.conn = Some(conn);
                Ok(())
            }
            Ok(Err(e)) => Err(PlayerError::Io(e)),
            Err(_) => Err(PlayerError::Timeout),
        }
    }

    pub async fn load_and_play(
        &mut self,
        playlist: &[PathBuf],
        loop_playback: bool,
    ) -> Result<(), PlayerError> {
        self.drain().await?;
        self.send_line("clear").await?;
        for path in playlist {
            self.send_line(&format!("add {}", path.display())).await?;
        }
        self.send_line(if loop_playback { "loop on" } else { "loop off" })
            .await?;
        info!(items = playlist.len(), loop_playback, "playlist replaced over rc");
        Ok(())
    }

    /// `status` exchange. Reads until a `( state ... )` line or the
    /// control timeout, whichever comes first.
    pub async fn query_status(&mut self) -> Result<PlayerStatus, PlayerError> {
        self.drain().await?;
        self.send_line("status").await?;

        let deadline = tokio::time::Instant::now() + self.control_timeout;
        let mut current: Option<PathBuf> = None;
        let mut line = String::new();
        let mut conn = self.take_conn().await?;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(PlayerError::Timeout);
            }

            line.clear();
            match timeout(remaining, conn.reader.read_line(&mut line)).await {
                Ok(Ok(0)) => {
                    return Err(PlayerError::Malformed("rc channel closed".to_string()));
                }
                Ok(Ok(_)) => {
                    let trimmed = line.trim();
                    if let Some(input) = parse_input_line(trimmed) {
                        current = Some(input);
                    }
                    if let Some(state) = parse_state_line(trimmed) {
                        self.conn = Some(conn);
                        return Ok(PlayerStatus { current, state });
                    }
                }
                Ok(Err(e)) => return Err(PlayerError::Io(e)),
                Err(_) => return Err(PlayerError::Timeout),
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if self.conn.is_some() {
            let _ = self.send_line("shutdown").await;
        }
        if let Some(mut child) = self.process.take() {
            let _ = child.kill().await;
        }
        self.conn = None;
    }
}

/// `( new input: file:///opt/signage/media/Promo_12.mp4 )` → the path,
/// with any `file://` prefix stripped.
fn parse_input_line(line: &str) -> Option<PathBuf> {
    let idx = line.find("new input:")?;
    let rest = line[idx + "new input:".len()..]
        .trim()
        .trim_end_matches(')')
        .trim();
    let path = rest.strip_prefix("file://").unwrap_or(rest);
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// `( state playing )` → `PlaybackState::Playing`, and so on.
fn parse_state_line(line: &str) -> Option<PlaybackState> {
    let idx = line.find("state ")?;
    let word = line[idx + "state ".len()..]
        .trim()
        .trim_end_matches(')')
        .trim();
    match word {
        "playing" => Some(PlaybackState::Playing),
        "paused" => Some(PlaybackState::Paused),
        "stopped" => Some(PlaybackState::Stopped),
        other => {
            warn!("unrecognized player state '{}'", other);
            None
        }
    }
}
