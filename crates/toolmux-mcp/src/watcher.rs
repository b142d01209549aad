//! Settings-file watching and per-server watch-path notices.
//!
//! Raw file-system events are noisy: editors fire several per save and some
//! platforms duplicate them. The settings watcher therefore re-stats the
//! file on every event and only reconciles when the modification time
//! actually advanced past the last observed value.

use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::SystemTime;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::task::JoinHandle;

use crate::hub::McpHub;

/// Watches the settings file and feeds reconciliation requests to the hub.
///
/// Holds the hub weakly so a disposed hub ends the watcher instead of the
/// watcher keeping the hub alive.
pub(crate) struct SettingsWatcher {
    /// Stored to keep the file-system watch alive.
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl SettingsWatcher {
    /// Start watching `path`; on each debounced change, reload through `hub`.
    pub fn spawn(path: PathBuf, hub: Weak<McpHub>) -> Result<Self, notify::Error> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        let _ = tx.send(());
                    }
                }
            })?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        let mut last_mtime = file_mtime(&path);
        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Drain the burst so one save triggers one reload.
                while rx.try_recv().is_ok() {}

                if !mtime_advanced(&mut last_mtime, file_mtime(&path)) {
                    continue;
                }

                let Some(hub) = hub.upgrade() else { break };
                tracing::info!(path = %path.display(), "Settings file changed; reconciling");
                hub.reload_settings(&path).await;
            }
            tracing::debug!("Settings watcher task exiting");
        });

        tracing::info!("Settings watcher started");
        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    /// Stop watching. Dropping the notify watcher releases the watch; the
    /// forwarding task is aborted explicitly.
    pub fn close(self) {
        self.task.abort();
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

/// Whether `current` is an observable advance past the last seen mtime.
/// Updates the record when it is.
fn mtime_advanced(last: &mut Option<SystemTime>, current: Option<SystemTime>) -> bool {
    match (&*last, current) {
        (_, None) => false,
        (None, Some(current)) => {
            *last = Some(current);
            true
        }
        (Some(seen), Some(current)) if current > *seen => {
            *last = Some(current);
            true
        }
        _ => false,
    }
}

/// Register notice-only watchers for a server's configured watch paths.
///
/// A change is logged; it does not restart the server. Paths that cannot be
/// watched are skipped with a warning.
pub(crate) fn watch_server_paths(server_name: &str, paths: &[String]) -> Vec<RecommendedWatcher> {
    let mut watchers = Vec::new();

    for path in paths {
        let name = server_name.to_string();
        let watched = path.clone();
        let created = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    tracing::info!(server_name = %name, path = %watched, "Watched path changed");
                }
            }
        });

        match created {
            Ok(mut watcher) => match watcher.watch(Path::new(path), RecursiveMode::Recursive) {
                Ok(()) => watchers.push(watcher),
                Err(e) => {
                    tracing::warn!(server_name, path = %path, error = %e, "Failed to watch path");
                }
            },
            Err(e) => {
                tracing::warn!(server_name, path = %path, error = %e, "Failed to create path watcher");
            }
        }
    }

    watchers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_mtime_advance_from_unknown() {
        let mut last = None;
        let now = SystemTime::now();
        assert!(mtime_advanced(&mut last, Some(now)));
        assert_eq!(last, Some(now));
    }

    #[test]
    fn test_mtime_duplicate_event_debounced() {
        let now = SystemTime::now();
        let mut last = Some(now);
        // Same mtime again: the event burst is a duplicate.
        assert!(!mtime_advanced(&mut last, Some(now)));
        // Older mtime never triggers either.
        assert!(!mtime_advanced(&mut last, Some(now - Duration::from_secs(5))));
        // An actual advance triggers and updates the record.
        let later = now + Duration::from_secs(1);
        assert!(mtime_advanced(&mut last, Some(later)));
        assert_eq!(last, Some(later));
    }

    #[test]
    fn test_mtime_unstattable_file_skipped() {
        let mut last = Some(SystemTime::now());
        assert!(!mtime_advanced(&mut last, None));
    }

    #[test]
    fn test_watch_server_paths_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().to_string_lossy().to_string();
        let missing = dir.path().join("gone").to_string_lossy().to_string();

        let watchers = watch_server_paths("files", &[good, missing]);
        assert_eq!(watchers.len(), 1);
    }

    #[test]
    fn test_file_mtime_reads_real_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(file_mtime(file.path()).is_some());
        assert!(file_mtime(Path::new("/nonexistent/settings.json")).is_none());
    }
}
