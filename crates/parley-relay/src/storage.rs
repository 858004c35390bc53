//! On-disk storage for relayed file payloads.

use std::path::PathBuf;

use anyhow::Result;
use tokio::fs;
use tracing::info;

/// Blob store for received files. Each payload lands at
/// `{root}/room_<roomId>/<timestamp>_s<senderId>_<name>`; the returned path
/// is what the message row records.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("File storage directory: {}", root.display());
        Ok(Self { root })
    }

    /// Persist one received file payload. Returns the stored path.
    pub async fn save(
        &self,
        room_id: i64,
        sender_id: i32,
        file_name: &str,
        data: &[u8],
    ) -> Result<String> {
        let dir = self.root.join(format!("room_{}", room_id));
        fs::create_dir_all(&dir).await?;

        let name = sanitize_file_name(file_name);
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
        let path = dir.join(format!("{}_s{}_{}", stamp, sender_id, name));

        fs::write(&path, data).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Reduce a client-supplied name to its final path component so a crafted
/// name cannot escape the storage directory.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        "unnamed".to_string()
    } else {
        base.to_string()
    }
}
