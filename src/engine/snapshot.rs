//! Engine state snapshots.
//!
//! The full `{orderbooks, balances}` state is serialized to a single file
//! atomically (temp file + rename) so a crashed engine can be restarted
//! with best-effort recovery. The snapshot is written between messages;
//! it never observes a half-applied command.

use std::path::Path;

use tracing::{info, warn};

use super::Engine;

pub async fn save(engine: &Engine, path: &Path) -> anyhow::Result<()> {
    let data = serde_json::to_vec(engine)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, &data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Load a snapshot if one exists. A corrupt snapshot is treated as
/// missing rather than fatal: the engine restarts empty and logs why.
pub async fn load(path: &Path) -> Option<Engine> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read snapshot");
            return None;
        }
    };

    match serde_json::from_slice::<Engine>(&data) {
        Ok(engine) => {
            info!(
                path = %path.display(),
                markets = engine.orderbooks.len(),
                users = engine.balances.len(),
                "snapshot loaded"
            );
            Some(engine)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot is corrupt, starting fresh");
            None
        }
    }
}
