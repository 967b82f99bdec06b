//! Publishing of packaged output trees.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::client::ObjectStore;
use crate::error::{StorageError, StorageResult};

/// Content type by file extension, covering everything the packager emits.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mpd") => "application/dash+xml",
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("mp4") | Some("m4s") | Some("m4v") => "video/mp4",
        Some("m4a") => "audio/mp4",
        Some("ts") => "video/mp2t",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Object key for a file at `rel` below the published prefix.
pub fn object_key(prefix: &str, rel: &Path) -> String {
    let rel = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", prefix.trim_end_matches('/'), rel)
}

/// Upload every regular file under `dir` to `key_prefix`, preserving the
/// relative layout. Returns the uploaded keys.
pub async fn upload_dir(
    store: &ObjectStore,
    dir: &Path,
    key_prefix: &str,
) -> StorageResult<Vec<String>> {
    let mut uploaded = Vec::new();
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let rel = path.strip_prefix(dir).map_err(|e| {
                StorageError::upload_failed(format!("path outside upload root: {}", e))
            })?;
            let key = object_key(key_prefix, rel);
            store
                .upload_file(&path, &key, content_type_for(&path))
                .await?;
            uploaded.push(key);
        }
    }

    info!(
        "Published {} files from {} under {}",
        uploaded.len(),
        dir.display(),
        key_prefix
    );
    Ok(uploaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_cover_packager_output() {
        assert_eq!(
            content_type_for(Path::new("manifest.mpd")),
            "application/dash+xml"
        );
        assert_eq!(
            content_type_for(Path::new("master.m3u8")),
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(content_type_for(Path::new("seg_001.m4s")), "video/mp4");
        assert_eq!(content_type_for(Path::new("720p.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("audio.m4a")), "audio/mp4");
        assert_eq!(content_type_for(Path::new("thumb.jpg")), "image/jpeg");
        assert_eq!(
            content_type_for(Path::new("unknown.bin")),
            "application/octet-stream"
        );
    }

    #[test]
    fn keys_use_forward_slashes_and_trimmed_prefix() {
        let rel = Path::new("segments").join("seg_001.m4s");
        assert_eq!(
            object_key("packaged/abc/", &rel),
            "packaged/abc/segments/seg_001.m4s"
        );
        assert_eq!(
            object_key("packaged/abc", Path::new("manifest.mpd")),
            "packaged/abc/manifest.mpd"
        );
    }
}
