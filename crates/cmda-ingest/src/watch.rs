//! Export-directory plumbing: file recognition, the per-order debounce
//! registry, and post-processing archival.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::{IngestService, Notifier, OrderStore};

/// The external id an export file maps to, or `None` when the path is not
/// an order export (wrong suffix, or already archived).
pub fn recognized_external_id(
    path: &Path,
    suffix: &str,
    processed_dir: &str,
    failed_dir: &str,
) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(suffix)?;
    if stem.is_empty() {
        return None;
    }
    let archived = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|d| d.to_str())
        .map_or(false, |d| d == processed_dir || d == failed_dir);
    if archived {
        return None;
    }
    Some(stem.to_string())
}

/// Move a handled file into `<parent>/<dir_name>/<millis>-<name>`; the
/// timestamp prefix keeps re-exports of the same order from colliding.
pub async fn archive(path: &Path, dir_name: &str) -> Result<PathBuf, std::io::Error> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let dir = parent.join(dir_name);
    tokio::fs::create_dir_all(&dir).await?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("export");
    let dest = dir.join(format!("{}-{}", Utc::now().timestamp_millis(), name));
    tokio::fs::rename(path, &dest).await?;
    Ok(dest)
}

impl<S: OrderStore + 'static, N: Notifier + 'static> IngestService<S, N> {
    /// Register a filesystem event. Every event for the same order resets
    /// its quiet-window timer; processing starts only once the file has
    /// been stable for the configured window, and an order already being
    /// processed is not re-entered.
    pub fn notify_file_event(self: &Arc<Self>, path: PathBuf) {
        let Some(external_id) = recognized_external_id(
            &path,
            &self.config.recognized_suffix,
            &self.config.processed_dir,
            &self.config.failed_dir,
        ) else {
            return;
        };

        let svc = Arc::clone(self);
        let key = external_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(svc.config.quiet_window).await;
            svc.debounce.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);

            {
                let mut in_flight = svc.in_flight.lock().unwrap_or_else(|e| e.into_inner());
                if !in_flight.insert(key.clone()) {
                    debug!(external_id = %key, "already processing, event dropped");
                    return;
                }
            }

            if let Err(e) = svc.process_file(&path).await {
                warn!(external_id = %key, error = %e, "export ingestion failed");
            }
            svc.in_flight.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);
        });

        let mut timers = self.debounce.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = timers.insert(external_id, handle) {
            previous.abort();
        }
    }

    /// Timers currently waiting out their quiet window.
    pub fn pending_debounce(&self) -> usize {
        self.debounce.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(path: &str) -> Option<String> {
        recognized_external_id(Path::new(path), ".posprt", "processed", "failed")
    }

    #[test]
    fn suffix_and_archive_recognition() {
        assert_eq!(rec("/watch/order-73.posprt").as_deref(), Some("order-73"));
        assert_eq!(rec("/watch/order-73.txt"), None);
        assert_eq!(rec("/watch/.posprt"), None);
        assert_eq!(rec("/watch/processed/123-order-73.posprt"), None);
        assert_eq!(rec("/watch/failed/order-73.posprt"), None);
        // Archive dirs only match as the immediate parent.
        assert_eq!(
            rec("/processed/watch/order-73.posprt").as_deref(),
            Some("order-73")
        );
    }

    #[tokio::test]
    async fn archive_moves_with_timestamp_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("order-1.posprt");
        tokio::fs::write(&src, b"payload").await.unwrap();

        let dest = archive(&src, "processed").await.unwrap();
        assert!(!src.exists());
        assert!(dest.exists());
        let name = dest.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("-order-1.posprt"), "{name}");
        assert_eq!(dest.parent().unwrap(), dir.path().join("processed"));
    }
}
