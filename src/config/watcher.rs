//! Configuration file watcher pushing node changes.
//!
//! Watches the configuration file and hands every successfully reloaded
//! configuration to a callback, typically one that applies the new node list.

use crate::config::{Config, load_config};
use crate::selector::Rebalancer;
use crate::util::CancelSignal;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Callback type for config reload.
pub type ReloadCallback = Box<dyn Fn(Config) + Send + Sync>;

/// Configuration file watcher.
pub struct ConfigWatcher {
    /// Path to the config file.
    config_path: PathBuf,
    /// Callback to invoke when config is reloaded.
    reload_callback: ReloadCallback,
}

impl ConfigWatcher {
    /// Create a new config watcher.
    pub fn new(config_path: PathBuf, reload_callback: ReloadCallback) -> Self {
        Self {
            config_path,
            reload_callback,
        }
    }

    /// Create a watcher that applies the reloaded node list to `target`.
    pub fn applying_to(config_path: PathBuf, target: Arc<dyn Rebalancer>) -> Self {
        Self::new(
            config_path,
            Box::new(move |config: Config| target.apply(config.nodes())),
        )
    }

    /// Get the path being watched.
    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Run the watcher until `stop` fires.
    ///
    /// Reloads on file modification or creation and, on Unix, on SIGHUP.
    pub async fn run(self, stop: CancelSignal) {
        info!(path = %self.config_path.display(), "config watcher starting");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher: Result<RecommendedWatcher, _> = Watcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(2)),
        );

        let mut watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "failed to create file watcher");
                stop.cancelled().await;
                return;
            }
        };

        // Editors often replace the file, so watch its directory.
        let dir = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            error!(error = %e, "failed to watch config directory");
            stop.cancelled().await;
            return;
        }

        #[cfg(unix)]
        let mut sighup =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(error = %e, "failed to setup SIGHUP handler");
                    None
                }
            };

        info!("config watcher ready, watching for changes");

        loop {
            tokio::select! {
                Some(event) = rx.recv() => {
                    if self.should_reload(&event) {
                        self.try_reload();
                    }
                }

                _ = async {
                    #[cfg(unix)]
                    {
                        match sighup.as_mut() {
                            Some(sig) => sig.recv().await,
                            None => std::future::pending::<Option<()>>().await,
                        }
                    }
                    #[cfg(not(unix))]
                    {
                        std::future::pending::<Option<()>>().await
                    }
                } => {
                    info!("received SIGHUP, reloading configuration");
                    self.try_reload();
                }

                _ = stop.cancelled() => {
                    info!("config watcher shutting down");
                    break;
                }
            }
        }
    }

    /// Check if this event should trigger a reload.
    fn should_reload(&self, event: &Event) -> bool {
        let is_our_file = event
            .paths
            .iter()
            .any(|p| p.file_name() == self.config_path.file_name());

        let is_modify_or_create = matches!(
            event.kind,
            notify::EventKind::Modify(_) | notify::EventKind::Create(_)
        );

        is_our_file && is_modify_or_create
    }

    /// Reload the file; a config that fails to load or validate is skipped.
    fn try_reload(&self) {
        let config = match load_config(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "failed to reload config, keeping current nodes");
                return;
            }
        };

        info!(
            path = %self.config_path.display(),
            nodes = config.nodes.len(),
            "configuration reloaded"
        );
        (self.reload_callback)(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{self, Selector};
    use std::io::Write;

    fn modify_event(path: &str) -> Event {
        Event {
            kind: notify::EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Content,
            )),
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_should_reload_modify() {
        let watcher = ConfigWatcher::new(PathBuf::from("/test/nodes.yaml"), Box::new(|_| {}));
        assert!(watcher.should_reload(&modify_event("/test/nodes.yaml")));
    }

    #[test]
    fn test_should_reload_wrong_file() {
        let watcher = ConfigWatcher::new(PathBuf::from("/test/nodes.yaml"), Box::new(|_| {}));
        assert!(!watcher.should_reload(&modify_event("/test/other.yaml")));
    }

    #[test]
    fn test_should_reload_delete_ignored() {
        let watcher = ConfigWatcher::new(PathBuf::from("/test/nodes.yaml"), Box::new(|_| {}));
        let event = Event {
            kind: notify::EventKind::Remove(notify::event::RemoveKind::File),
            paths: vec![PathBuf::from("/test/nodes.yaml")],
            attrs: Default::default(),
        };
        assert!(!watcher.should_reload(&event));
    }

    #[test]
    fn test_reload_applies_nodes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"nodes:\n  - address: \"127.0.0.1:9100\"\n  - address: \"127.0.0.1:9101\"\n")
            .unwrap();

        let target = Arc::new(selector::random());
        let watcher = ConfigWatcher::applying_to(file.path().to_path_buf(), target.clone());
        watcher.try_reload();

        assert_eq!(target.nodes().len(), 2);
    }

    #[test]
    fn test_reload_keeps_nodes_on_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"nodes:\n  - address: \"127.0.0.1:9100\"\n    weight: 0\n")
            .unwrap();

        let target = Arc::new(selector::random());
        target.apply(vec![selector::Node::new("http", "127.0.0.1:9000")]);
        let watcher = ConfigWatcher::applying_to(file.path().to_path_buf(), target.clone());
        watcher.try_reload();

        assert_eq!(target.nodes()[0].address(), "127.0.0.1:9000");
    }
}
