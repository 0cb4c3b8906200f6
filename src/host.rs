//! Interfaces the dictionary core needs from its host.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::HostError;

/// Stable identity of a project. Survives renames until the host reports one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub root: PathBuf,
}

impl Project {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: ProjectId::new(id),
            root: root.into(),
        }
    }
}

/// A file the project system reported an event for.
#[derive(Debug, Clone)]
pub struct ProjectItem {
    pub project: Project,
    pub path: PathBuf,
}

pub trait ProjectSystem: Send + Sync {
    /// The project `path` is an item of, if any.
    fn containing_project(&self, path: &Path) -> Option<Project>;

    fn add_item(&self, project: &Project, path: &Path) -> Result<(), HostError>;
}

pub type IdleListener = Box<dyn Fn(&dyn TextBuffer) + Send + Sync>;

/// A file open for editing in the host. Offsets are UTF-8 byte offsets into
/// [`text`](TextBuffer::text).
///
/// Editing is not thread agnostic: implementations hand `edit` over to
/// whatever context owns the buffer and return once it is queued there.
pub trait TextBuffer: Send + Sync {
    fn file_path(&self) -> PathBuf;

    fn text(&self) -> String;

    fn edit(&self, range: Range<usize>, text: &str) -> Result<(), HostError>;

    /// Calls `listener` whenever the buffer goes idle after an edit.
    fn on_idle(&self, listener: IdleListener) -> Subscription;
}

pub trait EditorSurface: Send + Sync {
    fn open_buffer(&self, path: &Path) -> Option<Arc<dyn TextBuffer>>;
}

pub trait Prompt: Send + Sync {
    fn confirm(&self, title: &str, question: &str) -> bool;

    fn show_error(&self, title: &str, message: &str);
}

/// Detaches a listener when dropped.
pub struct Subscription(Option<Box<dyn FnOnce() + Send>>);

impl Subscription {
    pub fn new<F: FnOnce() + Send + 'static>(unsubscribe: F) -> Self {
        Self(Some(Box::new(unsubscribe)))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.0.take() {
            unsubscribe();
        }
    }
}

/// The collaborators handed to every dictionary.
#[derive(Clone)]
pub struct Host {
    pub projects: Arc<dyn ProjectSystem>,
    pub editor: Arc<dyn EditorSurface>,
    pub prompt: Arc<dyn Prompt>,
}
