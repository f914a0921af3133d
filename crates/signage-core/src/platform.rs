use std::path::PathBuf;

/// Loopback port the VLC remote-control interface listens on.
pub const PLAYER_RC_PORT: u16 = 9877;
const PLAYER_RC_HOST: &str = "127.0.0.1";

pub fn player_rc_address(port: u16) -> String {
    format!("{}:{}", PLAYER_RC_HOST, port)
}

pub fn data_dir() -> PathBuf {
    // Linux/macOS: ~/.local/share/signage (XDG layout, same on both for
    // consistency across the fleet)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("signage")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signage")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("signage")
    }
    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signage")
    }
}

/// Default directory for downloaded media files.
pub fn media_dir() -> PathBuf {
    data_dir().join("media")
}

#[cfg(unix)]
fn vlc_binary_names() -> &'static [&'static str] {
    // cvlc preferred on headless installs (no Qt interface)
    &["cvlc", "vlc"]
}

#[cfg(windows)]
fn vlc_binary_names() -> &'static [&'static str] {
    &["vlc.exe", "vlc"]
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    for name in names {
        let p = dir.join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    #[cfg(unix)]
    let sep = ":";
    #[cfg(windows)]
    let sep = ";";
    for dir in path.split(sep) {
        for name in names {
            let p = PathBuf::from(dir).join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

/// Find the VLC binary used for playback.
///
/// Searches in order:
/// 1. VLC_PATH environment variable
/// 2. Beside the current executable
/// 3. PATH
/// 4. The stock Windows install location
pub fn find_vlc_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("VLC_PATH") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(p) = find_beside_exe(vlc_binary_names()) {
        return Some(p);
    }

    if let Some(p) = find_on_path(vlc_binary_names()) {
        return Some(p);
    }

    #[cfg(windows)]
    {
        let stock = PathBuf::from(r"C:\Program Files\VideoLAN\VLC\vlc.exe");
        if stock.exists() {
            return Some(stock);
        }
    }

    None
}
