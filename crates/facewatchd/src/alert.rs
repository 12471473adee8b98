//! Audible alert sinks.

use facewatch_core::{AlertError, AlertSink};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Plays a sound file through an external player.
///
/// The player runs in the background so a long clip never stalls the
/// capture loop; a detached thread waits on it so no zombie is left behind.
pub struct CommandAlertSink {
    player: String,
    sound: PathBuf,
}

impl CommandAlertSink {
    pub fn new(player: impl Into<String>, sound: impl Into<PathBuf>) -> Self {
        Self {
            player: player.into(),
            sound: sound.into(),
        }
    }
}

impl AlertSink for CommandAlertSink {
    fn notify(&self) -> Result<(), AlertError> {
        let mut child = Command::new(&self.player)
            .arg(&self.sound)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AlertError::Failed(format!("failed to spawn {}: {e}", self.player)))?;
        let pid = child.id();
        tracing::debug!(player = %self.player, pid, "alert playing");

        let spawned = std::thread::Builder::new()
            .name("facewatch-alert".into())
            .spawn(move || match child.wait() {
                Ok(status) if !status.success() => {
                    tracing::warn!(pid, %status, "alert player exited with failure")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(pid, error = %e, "failed to wait for alert player"),
            });
        if let Err(e) = spawned {
            tracing::warn!(pid, error = %e, "failed to start alert reaper thread");
        }
        Ok(())
    }
}

/// Rings the terminal bell on stderr.
pub struct BellAlertSink;

impl AlertSink for BellAlertSink {
    fn notify(&self) -> Result<(), AlertError> {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}
