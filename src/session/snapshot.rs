//! Session hand-off snapshots.
//!
//! The snapshot contains the bound context, credentials included, so the
//! file is written with owner-only permissions.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use super::state::{SessionState, TransportMode};
use crate::context::Context;
use crate::protocol::messages::ClientInfo;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub format_version: u32,
    pub session_id: String,
    pub created_at: i64,
    pub last_activity_at: i64,
    /// State at export time. Restored sessions always enter `Ready`.
    pub state: SessionState,
    pub transport_mode: TransportMode,
    pub protocol_version: String,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
    pub context: Context,
}

/// Atomically write `snapshot` as JSON to `path`.
pub fn write_snapshot(path: &Path, snapshot: &SessionSnapshot) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create snapshot directory {:?}", dir))?;

    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .context("Failed to restrict snapshot permissions")?;
    }
    serde_json::to_writer_pretty(&mut file, snapshot).context("Failed to encode snapshot")?;
    file.flush().context("Failed to flush snapshot")?;
    file.as_file()
        .sync_all()
        .context("Failed to sync snapshot")?;
    file.persist(path)
        .with_context(|| format!("Failed to move snapshot into place at {:?}", path))?;
    Ok(())
}

/// Read a snapshot written by [`write_snapshot`]. `Ok(None)` when the file
/// does not exist.
pub fn read_snapshot(path: &Path) -> Result<Option<SessionSnapshot>> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read snapshot {:?}", path)),
    };
    let snapshot: SessionSnapshot = serde_json::from_slice(&raw)
        .with_context(|| format!("Failed to parse snapshot {:?}", path))?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        anyhow::bail!(
            "Unsupported snapshot format version {} in {:?}",
            snapshot.format_version,
            path
        );
    }
    Ok(Some(snapshot))
}
