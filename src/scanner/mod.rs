use futures::stream::Stream;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::warn;
use walkdir::WalkDir;

/// Check if a path has a playable extension (mp3, wav; case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    matches!(ext.as_deref(), Some("mp3" | "wav"))
}

/// Scans the given files and directories for playable audio.
///
/// Files are yielded as given (if playable); directories are walked
/// recursively in file-name order. Returns a Stream of PathBufs.
pub fn scan(roots: Vec<PathBuf>) -> impl Stream<Item = PathBuf> {
    let (tx, rx) = mpsc::channel(100);

    // Spawn a blocking task to perform the synchronous file system traversal
    tokio::task::spawn_blocking(move || {
        for root in roots {
            let walker = WalkDir::new(&root).sort_by_file_name();
            for entry in walker.into_iter() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(target: "scanner", root = %root.display(), error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
                    continue;
                }
                // receiver dropped: stop scanning
                if tx.blocking_send(entry.into_path()).is_err() {
                    return;
                }
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|path| (path, rx))
    })
}

/// Collect every playable file under `roots`, in scan order.
pub async fn collect(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    use futures::StreamExt;
    scan(roots).collect().await
}
