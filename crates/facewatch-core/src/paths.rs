//! Default on-disk locations, shared by the daemon and the CLI.

use std::path::PathBuf;

/// `$XDG_DATA_HOME/facewatch`, falling back to `$HOME/.local/share/facewatch`.
pub fn data_dir(var: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(var).join(".local/share"))
        .join("facewatch")
}

/// `$XDG_CONFIG_HOME/facewatch`, falling back to `$HOME/.config/facewatch`.
pub fn config_dir(var: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(var).join(".config"))
        .join("facewatch")
}

/// `$FACEWATCH_MODEL_DIR`, else `models` under [`data_dir`].
pub fn model_dir(var: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    var("FACEWATCH_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir(var).join("models"))
}

/// Process environment lookup for the functions above.
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn home(var: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(var("HOME").unwrap_or_else(|| "/tmp".to_string()))
}
