use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tower_lsp::lsp_types::WorkspaceFolder;

use crate::error::HostError;
use crate::host::{Project, ProjectSystem};
use crate::lsp::documents::Documents;

/// Workspace folders acting as projects.
pub struct Workspace {
    folders: RwLock<Vec<Project>>,
    documents: Arc<Documents>,
}

impl Workspace {
    pub fn new(documents: Arc<Documents>) -> Self {
        Self {
            folders: RwLock::new(Vec::new()),
            documents,
        }
    }

    pub fn add_folder(&self, folder: &WorkspaceFolder) -> Option<Project> {
        let root = folder.uri.to_file_path().ok()?;
        let project = Project::new(root.display().to_string(), root);
        let mut folders = self.folders.write();
        if !folders.iter().any(|p| p.id == project.id) {
            folders.push(project.clone());
        }
        Some(project)
    }

    pub fn remove_folder(&self, folder: &WorkspaceFolder) -> Option<Project> {
        let root = folder.uri.to_file_path().ok()?;
        let mut folders = self.folders.write();
        let index = folders.iter().position(|p| p.root == root)?;
        Some(folders.remove(index))
    }

    pub fn folders(&self) -> Vec<Project> {
        self.folders.read().clone()
    }

    /// The innermost folder containing `path`, whether or not it exists.
    pub fn folder_of(&self, path: &Path) -> Option<Project> {
        self.folders
            .read()
            .iter()
            .filter(|p| path.starts_with(&p.root))
            .max_by_key(|p| p.root.components().count())
            .cloned()
    }
}

impl ProjectSystem for Workspace {
    /// Files are project items once they exist on disk or are open.
    fn containing_project(&self, path: &Path) -> Option<Project> {
        if !path.exists() && !self.documents.is_open(path) {
            return None;
        }
        self.folder_of(path)
    }

    fn add_item(&self, project: &Project, path: &Path) -> Result<(), HostError> {
        if !path.starts_with(&project.root) {
            return Err(HostError::new(format!(
                "{} is outside of {}",
                path.display(),
                project.root.display()
            )));
        }
        if !path.exists() {
            return Err(HostError::new(format!("{} does not exist", path.display())));
        }
        Ok(())
    }
}
