use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::codec;
use crate::config::Config;
use crate::debounce::Debouncer;
use crate::error::{AddWordError, PersistError, ReloadError};
use crate::events::{DictionaryEvent, EventBus};
use crate::host::{Host, Project, Subscription, TextBuffer};
use crate::watcher::{same_path, FileWatch};

const PROMPT_TITLE: &str = "Project Dictionary";

#[derive(Default)]
struct WordSets {
    recognized: BTreeSet<String>,
    /// Session only, never written to disk.
    ignored: BTreeSet<String>,
}

/// What a reload changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WordDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl WordDiff {
    pub fn between(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Self {
        Self {
            added: new.difference(old).cloned().collect(),
            removed: old.difference(new).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Added {
    /// Empty input, nothing to do.
    Nothing,
    AlreadyPresent,
    Persisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unloaded,
    Loaded,
    PendingReload,
    Disposed,
}

/// The accepted words of one project, kept in step with the dictionary file
/// on disk and with any open buffer of it.
pub struct Dictionary {
    file_path: PathBuf,
    project: RwLock<Project>,
    host: Host,
    words: Mutex<WordSets>,
    /// Held across every parse-and-replace and every add-and-persist.
    ops: Mutex<()>,
    loaded: AtomicBool,
    create_prompted: AtomicBool,
    reload: Arc<Debouncer>,
    watch: Mutex<Option<FileWatch>>,
    buffer: Mutex<Option<Subscription>>,
    events: EventBus,
    disposed: AtomicBool,
}

impl Dictionary {
    pub fn open(
        project: Project,
        file_path: PathBuf,
        host: Host,
        config: &Config,
        runtime: Handle,
    ) -> Arc<Self> {
        let project_id = project.id.clone();
        let dictionary = Arc::new_cyclic(|weak: &Weak<Dictionary>| {
            let weak = weak.clone();
            let reload = Debouncer::new(runtime, config.reload_delay(), move || {
                let Some(dictionary) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = dictionary.reload(false) {
                    debug!("deferred reload of {} failed: {e}", dictionary.file_path.display());
                }
            });
            Dictionary {
                file_path,
                project: RwLock::new(project),
                host,
                words: Mutex::new(WordSets::default()),
                ops: Mutex::new(()),
                loaded: AtomicBool::new(false),
                create_prompted: AtomicBool::new(false),
                reload: Arc::new(reload),
                watch: Mutex::new(None),
                buffer: Mutex::new(None),
                events: EventBus::new(),
                disposed: AtomicBool::new(false),
            }
        });

        if config.watch_files {
            dictionary.watch();
        }

        // Only read straight from disk here. Going through the editor would
        // resolve the dictionary's own project again.
        let owner = dictionary.host.projects.containing_project(&dictionary.file_path);
        if owner.is_some_and(|p| p.id == project_id) {
            let _ops = dictionary.ops.lock();
            if let Err(e) = dictionary.load_from_disk() {
                debug!("initial load of {} failed: {e}", dictionary.file_path.display());
            }
        }
        dictionary
    }

    fn watch(&self) {
        let reload = self.reload.clone();
        match FileWatch::new(&self.file_path, move |_| reload.signal()) {
            Ok(watch) => *self.watch.lock() = Some(watch),
            Err(e) => warn!("not watching {}: {e}", self.file_path.display()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn project(&self) -> Project {
        self.project.read().clone()
    }

    pub(crate) fn set_project(&self, project: Project) {
        *self.project.write() = project;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DictionaryEvent> {
        self.events.subscribe()
    }

    pub fn recognized_words(&self) -> BTreeSet<String> {
        self.words.lock().recognized.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> State {
        if self.is_disposed() {
            State::Disposed
        } else if self.reload.is_armed() {
            State::PendingReload
        } else if self.loaded.load(Ordering::SeqCst) {
            State::Loaded
        } else {
            State::Unloaded
        }
    }

    /// Re-reads the word list after an external change, once changes have
    /// been quiet for the configured delay.
    pub fn schedule_reload(&self) {
        if !self.is_disposed() {
            self.reload.signal();
        }
    }

    /// Re-reads the word list from the open buffer if there is one, else
    /// from disk. A dictionary file that no longer belongs to a project
    /// empties the set. On error the set is left as it was.
    pub fn reload(&self, reset_create_prompt: bool) -> Result<WordDiff, ReloadError> {
        if self.is_disposed() {
            return Err(ReloadError::Disposed);
        }
        if reset_create_prompt {
            self.create_prompted.store(false, Ordering::SeqCst);
        }
        debug!("reloading {}", self.file_path.display());
        let _ops = self.ops.lock();

        if self.host.projects.containing_project(&self.file_path).is_none() {
            return Ok(self.clear());
        }

        match self.host.editor.open_buffer(&self.file_path) {
            Some(buffer) => {
                let words = codec::parse(&buffer.text())?;
                Ok(self.replace(words))
            }
            None => self.load_from_disk(),
        }
    }

    fn load_from_disk(&self) -> Result<WordDiff, ReloadError> {
        let text = fs::read_to_string(&self.file_path)?;
        let words = codec::parse(&text)?;
        Ok(self.replace(words))
    }

    fn clear(&self) -> WordDiff {
        let removed = std::mem::take(&mut self.words.lock().recognized);
        self.loaded.store(true, Ordering::SeqCst);
        if !removed.is_empty() {
            self.events.publish(DictionaryEvent::RecheckAll);
        }
        WordDiff {
            added: BTreeSet::new(),
            removed,
        }
    }

    fn replace(&self, new: BTreeSet<String>) -> WordDiff {
        let diff = {
            let mut words = self.words.lock();
            let diff = WordDiff::between(&words.recognized, &new);
            words.recognized = new;
            diff
        };
        self.loaded.store(true, Ordering::SeqCst);

        debug!(
            "{}: {} added, {} removed",
            self.file_path.display(),
            diff.added.len(),
            diff.removed.len()
        );
        for word in &diff.added {
            self.events.publish(DictionaryEvent::WordAdded(word.clone()));
        }
        if !diff.removed.is_empty() {
            self.events.publish(DictionaryEvent::RecheckAll);
        }
        diff
    }

    pub fn add_word(&self, word: &str) -> bool {
        match self.try_add_word(word) {
            Ok(_) => true,
            Err(e) => {
                warn!("could not add {word:?} to {}: {e}", self.file_path.display());
                false
            }
        }
    }

    /// Accepts `word` and writes it to the dictionary file.
    ///
    /// The word is visible to [`should_ignore`](Self::should_ignore) before
    /// it is written, and stays visible if writing fails.
    pub fn try_add_word(&self, word: &str) -> Result<Added, AddWordError> {
        if word.is_empty() {
            return Ok(Added::Nothing);
        }
        if self.host.projects.containing_project(&self.file_path).is_none() {
            self.prompt_to_create()?;
        }

        let _ops = self.ops.lock();
        if !self.words.lock().recognized.insert(word.to_string()) {
            return Ok(Added::AlreadyPresent);
        }

        self.persist(word)?;
        self.events.publish(DictionaryEvent::WordAdded(word.to_string()));
        Ok(Added::Persisted)
    }

    fn persist(&self, word: &str) -> Result<(), PersistError> {
        if let Some(buffer) = self.host.editor.open_buffer(&self.file_path) {
            let text = buffer.text();
            if let Some(edit) = codec::insertion(&text, word)? {
                buffer
                    .edit(edit.range, &edit.text)
                    .map_err(PersistError::Buffer)?;
            }
            return Ok(());
        }

        let existing = match fs::read_to_string(&self.file_path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(updated) = codec::insert_word(existing.as_deref(), word)? {
            fs::write(&self.file_path, updated)?;
        }
        Ok(())
    }

    fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Asks, at most once until the next reset, whether to create the
    /// dictionary file and add it to the project.
    fn prompt_to_create(&self) -> Result<(), AddWordError> {
        if self.create_prompted.swap(true, Ordering::SeqCst) {
            return Err(AddWordError::Declined);
        }
        let prompt = &self.host.prompt;
        let name = self.file_name();

        if !prompt.confirm(PROMPT_TITLE, &format!("Add a {name} file to this project?")) {
            return Err(AddWordError::Declined);
        }

        let keep_existing = self.file_path.exists()
            && prompt.confirm(
                PROMPT_TITLE,
                &format!(
                    "{name} already exists. Use the existing file?\n\
                     (Select No to replace it with an empty dictionary)"
                ),
            );
        if !keep_existing {
            if let Err(e) = fs::write(&self.file_path, codec::TEMPLATE) {
                prompt.show_error(&format!("Can't create {name}"), &e.to_string());
                return Err(PersistError::CreateFailed(e).into());
            }
            info!("created {}", self.file_path.display());
        }

        let project = self.project();
        self.host
            .projects
            .add_item(&project, &self.file_path)
            .map_err(|e| {
                prompt.show_error(&format!("Can't add {name} to {}", project.id), &e.to_string());
                AddWordError::Host(e)
            })
    }

    /// Accepts `word` for this session only. Returns false for empty or
    /// already recognized words.
    pub fn ignore_word(&self, word: &str) -> bool {
        if word.is_empty() {
            return false;
        }
        let mut words = self.words.lock();
        if words.recognized.contains(word) {
            return false;
        }
        words.ignored.insert(word.to_string());
        true
    }

    pub fn should_ignore(&self, word: &str) -> bool {
        let words = self.words.lock();
        words.recognized.contains(word) || words.ignored.contains(word)
    }

    /// Reparses the dictionary from `buffer` every time it goes idle after
    /// an edit. Replaces any previous buffer connection.
    pub fn connect_to_open_buffer(self: &Arc<Self>, buffer: &dyn TextBuffer) {
        if self.is_disposed() {
            return;
        }
        let weak = Arc::downgrade(self);
        let subscription = buffer.on_idle(Box::new(move |buffer| {
            let Some(dictionary) = weak.upgrade() else {
                return;
            };
            if let Err(e) = dictionary.reparse_buffer(buffer) {
                debug!("{} not reparsed: {e}", dictionary.file_path.display());
            }
        }));
        *self.buffer.lock() = Some(subscription);
    }

    fn reparse_buffer(&self, buffer: &dyn TextBuffer) -> Result<WordDiff, ReloadError> {
        if self.is_disposed() {
            return Err(ReloadError::Disposed);
        }
        // The buffer may have been renamed to something else.
        if !same_path(&buffer.file_path(), &self.file_path) {
            return Ok(WordDiff::default());
        }
        let _ops = self.ops.lock();
        let words = codec::parse(&buffer.text())?;
        Ok(self.replace(words))
    }

    /// Stops watching and drops any pending reload. Safe to call twice.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reload.close();
        self.watch.lock().take();
        self.buffer.lock().take();
        debug!("disposed dictionary {}", self.file_path.display());
    }
}

impl Drop for Dictionary {
    fn drop(&mut self) {
        self.dispose();
    }
}
