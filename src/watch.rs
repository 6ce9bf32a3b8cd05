//! Page root watcher.
//!
//! Every create/modify/remove event under the page root is handed to the
//! plugin, which broadcasts a full reload. Events are not debounced: a burst
//! of writes may reload the browser more than once, which is harmless.
//!
//! ```text
//! notify ──► is_relevant() ──► plugin.on_change(paths) ──► hub.full_reload()
//! ```

use crate::{log, plugin::PagesPlugin, reload::Broadcast};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::{path::Path, sync::mpsc};

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Format path as relative to `root` for log display.
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// Forward one watcher event. Returns whether a reload was broadcast.
fn handle_event(event: &Event, plugin: &PagesPlugin, hub: &dyn Broadcast) -> bool {
    if !is_relevant(event) {
        return false;
    }

    let reloaded = plugin.on_change(&event.paths, hub);
    if reloaded {
        let root = plugin.root().dir();
        let changed: Vec<_> = event.paths.iter().map(|p| rel_path(p, root)).collect();
        log!("watch"; "{} changed", changed.join(", "));
    }
    reloaded
}

/// Watch the page root until the event channel closes.
pub fn watch_for_changes_blocking(plugin: &PagesPlugin, hub: &dyn Broadcast) -> Result<()> {
    let dir = plugin.root().dir();
    if !dir.exists() {
        log!("watch"; "{} does not exist, nothing to watch", dir.display());
        return Ok(());
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    watcher
        .watch(dir, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;
    log!("watch"; "{}", dir.display());

    for result in rx {
        match result {
            Ok(event) => {
                handle_event(&event, plugin, hub);
            }
            Err(e) => log!("watch"; "error: {e}"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::tests::{CountingHub, fixture};
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    #[test]
    fn test_modify_under_root_reloads() {
        let (_dir, plugin) = fixture(&[("index.ts", "static:<p>hi</p>")]);
        let hub = CountingHub::default();
        let path = plugin.root().dir().join("index.ts");

        assert!(handle_event(&event(EventKind::Modify(ModifyKind::Any), &path), &plugin, &hub));
        assert_eq!(hub.count(), 1);
    }

    #[test]
    fn test_partial_change_reloads() {
        let (_dir, plugin) = fixture(&[("_layout.ts", "static:")]);
        let hub = CountingHub::default();
        let path = plugin.root().dir().join("_layout.ts");

        assert!(handle_event(&event(EventKind::Create(CreateKind::File), &path), &plugin, &hub));
        assert!(handle_event(&event(EventKind::Remove(RemoveKind::File), &path), &plugin, &hub));
        assert_eq!(hub.count(), 2);
    }

    #[test]
    fn test_access_events_ignored() {
        let (_dir, plugin) = fixture(&[("index.ts", "static:")]);
        let hub = CountingHub::default();
        let path = plugin.root().dir().join("index.ts");

        assert!(!handle_event(&event(EventKind::Access(AccessKind::Any), &path), &plugin, &hub));
        assert_eq!(hub.count(), 0);
    }

    #[test]
    fn test_change_outside_root_ignored() {
        let (dir, plugin) = fixture(&[("index.ts", "static:")]);
        let hub = CountingHub::default();
        let path = dir.path().join("vite.config.ts");

        assert!(!handle_event(&event(EventKind::Modify(ModifyKind::Any), &path), &plugin, &hub));
        assert_eq!(hub.count(), 0);
    }

    #[test]
    fn test_rel_path() {
        let root = Path::new("/site/pages");
        assert_eq!(rel_path(Path::new("/site/pages/blog/a.ts"), root), "blog/a.ts");
        assert_eq!(rel_path(Path::new("/elsewhere/x.ts"), root), "/elsewhere/x.ts");
    }
}
