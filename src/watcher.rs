//! Watches a single file for external changes.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use log::debug;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Changed,
    Created,
    Deleted,
    Renamed,
}

/// A `notify` watcher on the parent directory, filtered down to one file
/// name. Dropping it stops the watch.
pub struct FileWatch {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FileWatch {
    pub fn new<F>(path: &Path, on_change: F) -> notify::Result<Self>
    where
        F: Fn(FileChange) + Send + 'static,
    {
        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = path.file_name().map(OsStr::to_os_string).unwrap_or_default();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };
            if !event.paths.iter().any(|p| same_file_name(p, &name)) {
                return;
            }
            if let Some(change) = convert_event(&event) {
                debug!("{:?} {:?}", change, event.paths);
                on_change(change);
            }
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        Ok(Self {
            path: path.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn convert_event(event: &Event) -> Option<FileChange> {
    match event.kind {
        EventKind::Create(_) => Some(FileChange::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileChange::Renamed),
        EventKind::Modify(_) => Some(FileChange::Changed),
        EventKind::Remove(_) => Some(FileChange::Deleted),
        EventKind::Any if event.paths.len() >= 2 => Some(FileChange::Renamed),
        _ => None,
    }
}

fn same_file_name(path: &Path, name: &OsStr) -> bool {
    path.file_name().is_some_and(|n| n.eq_ignore_ascii_case(name))
}

/// Comparison of two full paths, ignoring ASCII case.
pub fn same_path(a: &Path, b: &Path) -> bool {
    a.as_os_str().eq_ignore_ascii_case(b.as_os_str())
}

/// Whether the final component of `path` is `file_name`, ignoring ASCII case.
pub fn has_file_name(path: &Path, file_name: &str) -> bool {
    same_file_name(path, OsStr::new(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};
    use std::sync::mpsc;
    use std::time::Duration;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn converts_event_kinds() {
        let cases = [
            (EventKind::Create(CreateKind::File), Some(FileChange::Created)),
            (
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                Some(FileChange::Changed),
            ),
            (
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                Some(FileChange::Renamed),
            ),
            (EventKind::Remove(RemoveKind::File), Some(FileChange::Deleted)),
            (EventKind::Access(AccessKind::Read), None),
        ];
        for (kind, expected) in cases {
            assert_eq!(convert_event(&event(kind, &["/p/a.xml"])), expected);
        }
        assert_eq!(
            convert_event(&event(EventKind::Any, &["/p/a.xml", "/p/b.xml"])),
            Some(FileChange::Renamed)
        );
        assert_eq!(convert_event(&event(EventKind::Any, &["/p/a.xml"])), None);
    }

    #[test]
    fn file_names_match_ignoring_case() {
        assert!(has_file_name(Path::new("/proj/customdictionary.XML"), "CustomDictionary.xml"));
        assert!(!has_file_name(Path::new("/proj/other.xml"), "CustomDictionary.xml"));
        assert!(same_path(Path::new("/A/b.xml"), Path::new("/a/B.XML")));
        assert!(!same_path(Path::new("/a/b.xml"), Path::new("/a/b.xml.bak")));
    }

    #[test]
    fn reports_changes_to_the_watched_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("CustomDictionary.xml");
        let (tx, rx) = mpsc::channel();

        let watch = FileWatch::new(&target, move |change| {
            let _ = tx.send(change);
        })
        .unwrap();
        assert_eq!(watch.path(), target.as_path());

        std::fs::write(dir.path().join("unrelated.txt"), "x").unwrap();
        std::fs::write(&target, "<Dictionary/>").unwrap();

        let change = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(change, FileChange::Created | FileChange::Changed));
    }
}
