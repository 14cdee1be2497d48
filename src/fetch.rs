use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tokio::fs;
use tracing::{debug, warn};

/// Per-path outcome. Failures carry a display string because they are shown
/// to the user, not matched on.
pub type FileResult = std::result::Result<String, String>;

const BATCH_CONCURRENCY: usize = 50;

pub async fn read_file(path: &Path) -> FileResult {
    fs::read_to_string(path).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "read failed");
        e.to_string()
    })
}

/// One round trip for the whole set. Every requested path gets exactly one
/// entry back; a failure for one path never removes or alters the others.
pub async fn read_batch(paths: Vec<PathBuf>) -> HashMap<PathBuf, FileResult> {
    debug!(count = paths.len(), "batch read");
    stream::iter(paths)
        .map(|path| async move {
            let result = read_file(&path).await;
            (path, result)
        })
        .buffer_unordered(BATCH_CONCURRENCY)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[tokio::test]
    async fn batch_returns_one_entry_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        stdfs::write(&good, "hello").unwrap();
        let missing = dir.path().join("missing.txt");

        let results = read_batch(vec![good.clone(), missing.clone()]).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[&good].as_deref(), Ok("hello"));
        assert!(results[&missing].is_err());
    }

    #[tokio::test]
    async fn single_read_matches_batch_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        stdfs::write(&path, "content").unwrap();
        assert_eq!(read_file(&path).await.as_deref(), Ok("content"));
    }
}
