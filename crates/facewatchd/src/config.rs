use facewatch_core::{paths, DEFAULT_COOLDOWN_SECS};
use std::path::PathBuf;

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture width.
    pub camera_width: u32,
    /// Requested capture height.
    pub camera_height: u32,
    /// Number of warmup frames to discard when a session opens the camera.
    pub warmup_frames: usize,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// TOML manifest listing the known identities and their reference images.
    pub gallery_manifest: PathBuf,
    /// CSV file that accepted matches are appended to.
    pub event_log: PathBuf,
    /// Per-identity alert cooldown in seconds.
    pub cooldown_secs: i64,
    /// Sound file played on each accepted match. `None` rings the terminal bell.
    pub alert_sound: Option<PathBuf>,
    /// Program used to play `alert_sound`.
    pub alert_player: String,
    /// Where the most recent annotated frame is written as JPEG, if anywhere.
    pub preview_path: Option<PathBuf>,
    /// Start a capture session as soon as the daemon is up.
    pub autostart: bool,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `FACEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(paths::env_var)
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = paths::data_dir(&var);
        let config_dir = paths::config_dir(&var);

        Self {
            camera_device: var("FACEWATCH_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            camera_width: parse_or(&var, "FACEWATCH_CAMERA_WIDTH", 640),
            camera_height: parse_or(&var, "FACEWATCH_CAMERA_HEIGHT", 480),
            warmup_frames: parse_or(&var, "FACEWATCH_WARMUP_FRAMES", 4),
            model_dir: paths::model_dir(&var),
            gallery_manifest: var("FACEWATCH_GALLERY")
                .map(PathBuf::from)
                .unwrap_or_else(|| config_dir.join("gallery.toml")),
            event_log: var("FACEWATCH_EVENT_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("recognized_faces.csv")),
            cooldown_secs: parse_or(&var, "FACEWATCH_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS),
            alert_sound: var("FACEWATCH_ALERT_SOUND")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            alert_player: var("FACEWATCH_ALERT_PLAYER").unwrap_or_else(|| "paplay".to_string()),
            preview_path: var("FACEWATCH_PREVIEW_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            autostart: var("FACEWATCH_AUTOSTART")
                .map(|v| v != "0")
                .unwrap_or(false),
            bus: match var("FACEWATCH_BUS").as_deref() {
                Some("system") => BusKind::System,
                _ => BusKind::Session,
            },
        }
    }
}

fn parse_or<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
