//! # Configuration Watcher
//!
//! Observes the servers configuration file and republishes the routing
//! plane whenever the file changes. Filesystem events are debounced, the
//! file is re-read and re-parsed, and only a successfully parsed
//! configuration replaces the active one; a broken edit leaves the
//! previous routing plane in place.
//!
//! The watcher observes the parent directory rather than the file itself,
//! so a configuration file that appears only after startup is still picked
//! up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecursiveMode, Watcher};

use crate::routing::servers::ServersConfig;
use crate::service::registry;

const DEBOUNCE: Duration = Duration::from_millis(150);

/// Reads and parses the configuration file, publishing it on success.
///
/// Returns whether a valid configuration is active after the call. A
/// re-read that produces the already-active version is recognized by its
/// digest and skipped.
pub fn load_once(path: &Path) -> bool {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(err) => {
            log::error!("can not read {}: {}", path.display(), err);
            return false;
        }
    };
    match ServersConfig::parse(&raw) {
        Ok(config) => {
            let unchanged =
                registry::current().is_some_and(|live| live.version() == config.version());
            if unchanged {
                log::debug!("servers configuration unchanged");
            } else {
                registry::publish(config);
            }
            true
        }
        Err(err) => {
            log::error!(
                "invalid servers configuration in {}: {}",
                path.display(),
                err
            );
            false
        }
    }
}

pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl ConfigWatcher {
    /// Starts watching the configuration file.
    ///
    /// Modify and create events for the file are funneled into a small
    /// debounce loop on the runtime; each quiet period triggers one reload
    /// attempt, provided the file still exists. The returned handle keeps
    /// the underlying watcher alive and must be held for the lifetime of
    /// the process.
    pub fn start(path: PathBuf) -> Result<Self, notify::Error> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(16);

        let file_name = path.file_name().map(|name| name.to_os_string());
        let mut watcher =
            notify::recommended_watcher(move |result: Result<notify::Event, notify::Error>| {
                let Ok(event) = result else { return };
                if !event.kind.is_modify() && !event.kind.is_create() {
                    return;
                }
                let concerns_config = event
                    .paths
                    .iter()
                    .any(|changed| changed.file_name() == file_name.as_deref());
                if concerns_config {
                    let _ = tx.blocking_send(());
                }
            })?;

        let watch_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        tokio::spawn(async move {
            let mut deadline: Option<tokio::time::Instant> = None;
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(()) => {
                            deadline = Some(tokio::time::Instant::now() + DEBOUNCE);
                        }
                        None => break,
                    },
                    _ = async {
                        match deadline {
                            Some(deadline) => tokio::time::sleep_until(deadline).await,
                            None => std::future::pending::<()>().await,
                        }
                    } => {
                        deadline = None;
                        if path.exists() {
                            load_once(&path);
                        }
                    }
                }
            }
        });

        Ok(ConfigWatcher { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_once_publishes_a_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0.* http://a:8001/\n1.* http://b:8001/\n")
            .unwrap();
        assert!(load_once(file.path()));
        assert!(registry::current().is_some());
        // A second load of the same bytes is recognized as unchanged.
        assert!(load_once(file.path()));
    }

    #[test]
    fn test_load_once_rejects_a_broken_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0.* http://a:8001/\n").unwrap();
        assert!(!load_once(file.path()));
    }

    #[test]
    fn test_load_once_rejects_a_missing_file() {
        assert!(!load_once(Path::new("/nonexistent/apiproxy.conf")));
    }
}
