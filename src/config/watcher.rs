//! Source tree watcher for development reloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// A change observed under the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    /// Paths reported by the file system event.
    pub paths: Vec<PathBuf>,
}

/// Watches an application root and asks for a reload when something changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ReloadRequest>,
}

impl ConfigWatcher {
    /// Create a new watcher.
    ///
    /// Returns the watcher and a receiver for reload requests.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ReloadRequest>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Another handle for requesting reloads (e.g. on SIGHUP).
    pub fn sender(&self) -> mpsc::UnboundedSender<ReloadRequest> {
        self.update_tx.clone()
    }

    /// Start watching in a background thread.
    ///
    /// The returned handle must be kept alive for as long as events are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_reload_trigger(&event) {
                        tracing::info!(paths = ?event.paths, "Source change detected, requesting reload");
                        let _ = tx.send(ReloadRequest { paths: event.paths });
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::Recursive)?;

        tracing::info!(path = ?self.path, "Source watcher started");
        Ok(watcher)
    }
}

fn is_reload_trigger(event: &Event) -> bool {
    (event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove())
        && event.paths.iter().any(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("rs") | Some("toml")
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind};

    #[test]
    fn test_reload_trigger_filters_extensions() {
        let rs = Event::new(EventKind::Create(CreateKind::File)).add_path("app/actions/home.rs".into());
        assert!(is_reload_trigger(&rs));

        let swap = Event::new(EventKind::Create(CreateKind::File)).add_path("app/.home.rs.swp".into());
        assert!(!is_reload_trigger(&swap));

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path("slicekit.toml".into());
        assert!(!is_reload_trigger(&access));
    }
}
