use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info};
use tokio::runtime::Handle;

use crate::config::Config;
use crate::dictionary::Dictionary;
use crate::host::{Host, Project, ProjectId, ProjectItem, TextBuffer};
use crate::watcher::has_file_name;

type CreatedHook = Box<dyn Fn(&Arc<Dictionary>) + Send + Sync>;

/// One [`Dictionary`] per live project, created on first use.
pub struct Registry {
    host: Host,
    config: Config,
    runtime: Handle,
    dictionaries: DashMap<ProjectId, Arc<Dictionary>>,
    on_created: Option<CreatedHook>,
}

impl Registry {
    pub fn new(host: Host, config: Config, runtime: Handle) -> Self {
        Self {
            host,
            config,
            runtime,
            dictionaries: DashMap::new(),
            on_created: None,
        }
    }

    /// Runs `hook` for every dictionary right after it is constructed.
    pub fn on_dictionary_created<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Dictionary>) + Send + Sync + 'static,
    {
        self.on_created = Some(Box::new(hook));
        self
    }

    pub fn is_dictionary_file(&self, path: &Path) -> bool {
        has_file_name(path, &self.config.file_name)
    }

    pub fn len(&self) -> usize {
        self.dictionaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }

    /// The dictionary of the project that owns `path`. `None` means the file
    /// belongs to no project and the caller should use its default words.
    pub fn resolve_dictionary(&self, path: &Path) -> Option<Arc<Dictionary>> {
        let project = self.host.projects.containing_project(path)?;
        if project.id.is_empty() {
            debug!("{} is not part of a project", path.display());
            return None;
        }
        if let Some(existing) = self.dictionaries.get(&project.id) {
            return Some(existing.clone());
        }

        let entry = self.dictionaries.entry(project.id.clone()).or_insert_with(|| {
            let file_path = project.root.join(&self.config.file_name);
            info!("created dictionary {} for {}", file_path.display(), project.id);
            let dictionary = Dictionary::open(
                project.clone(),
                file_path,
                self.host.clone(),
                &self.config,
                self.runtime.clone(),
            );
            if let Some(hook) = &self.on_created {
                hook(&dictionary);
            }
            dictionary
        });
        Some(entry.value().clone())
    }

    pub fn existing(&self, project: &ProjectId) -> Option<Arc<Dictionary>> {
        self.dictionaries.get(project).map(|d| d.value().clone())
    }

    /// Whether `word` is accepted for `path`. Files outside any project
    /// accept nothing here.
    pub fn is_word_accepted(&self, path: &Path, word: &str) -> bool {
        self.resolve_dictionary(path)
            .is_some_and(|d| d.should_ignore(word))
    }

    /// Called for every buffer the editor opens; only dictionary files are
    /// of interest.
    pub fn register_open_buffer(&self, buffer: &dyn TextBuffer) {
        let path = buffer.file_path();
        if !self.is_dictionary_file(&path) {
            return;
        }
        if let Some(dictionary) = self.resolve_dictionary(&path) {
            dictionary.connect_to_open_buffer(buffer);
        }
    }

    pub fn item_added(&self, item: &ProjectItem) {
        self.item_added_or_removed(item);
    }

    pub fn item_removed(&self, item: &ProjectItem) {
        self.item_added_or_removed(item);
    }

    fn item_added_or_removed(&self, item: &ProjectItem) {
        if !self.is_dictionary_file(&item.path) {
            return;
        }
        if let Some(dictionary) = self.existing(&item.project.id) {
            if let Err(e) = dictionary.reload(true) {
                debug!("reload after item change failed: {e}");
            }
        }
    }

    pub fn item_renamed(&self, item: &ProjectItem, old_path: &Path) {
        if !self.is_dictionary_file(&item.path) && !self.is_dictionary_file(old_path) {
            return;
        }
        let Some(dictionary) = self.existing(&item.project.id) else {
            return;
        };
        if let Some(buffer) = self.host.editor.open_buffer(dictionary.file_path()) {
            dictionary.connect_to_open_buffer(buffer.as_ref());
        }
        if let Err(e) = dictionary.reload(true) {
            debug!("reload after rename failed: {e}");
        }
    }

    pub fn project_removed(&self, project: &ProjectId) {
        if project.is_empty() {
            return;
        }
        if let Some((_, dictionary)) = self.dictionaries.remove(project) {
            dictionary.dispose();
            debug!("removed dictionary for {project}");
        }
    }

    /// Moves the dictionary of `old` over to `project` without rebuilding it.
    pub fn project_renamed(&self, old: &ProjectId, project: &Project) {
        if old.is_empty() {
            return;
        }
        let Some((_, dictionary)) = self.dictionaries.remove(old) else {
            return;
        };
        if project.id.is_empty() {
            dictionary.dispose();
            return;
        }
        dictionary.set_project(project.clone());
        debug!("dictionary for {old} now belongs to {}", project.id);
        self.dictionaries.insert(project.id.clone(), dictionary);
    }

    pub fn solution_closed(&self) {
        let ids: Vec<ProjectId> = self.dictionaries.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, dictionary)) = self.dictionaries.remove(&id) {
                dictionary.dispose();
            }
        }
        info!("released all dictionaries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::events::DictionaryEvent;
    use crate::host::fake::FakeHost;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        fake: FakeHost,
        project: Project,
        source: PathBuf,
        dictionary: PathBuf,
    }

    fn fixture(words: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::new("app.proj", dir.path());
        let source = dir.path().join("main.rs");
        let dictionary = dir.path().join("CustomDictionary.xml");

        let mut xml = codec::TEMPLATE.to_string();
        for w in words {
            xml = codec::insert_word(Some(&xml), w).unwrap().unwrap();
        }
        fs::write(&dictionary, xml).unwrap();

        let fake = FakeHost::default();
        fake.projects.add_project(project.clone());
        fake.projects.include(&source);
        fake.projects.include(&dictionary);
        Fixture {
            dir,
            fake,
            project,
            source,
            dictionary,
        }
    }

    impl Fixture {
        fn registry(&self) -> Registry {
            let config = Config {
                watch_files: false,
                ..Config::default()
            };
            Registry::new(self.fake.host(), config, Handle::current())
        }

        fn item(&self, path: &Path) -> ProjectItem {
            ProjectItem {
                project: self.project.clone(),
                path: path.to_path_buf(),
            }
        }
    }

    #[tokio::test]
    async fn creates_one_dictionary_per_project() {
        let fx = fixture(&["tokio"]);
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let registry = fx
            .registry()
            .on_dictionary_created(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let first = registry.resolve_dictionary(&fx.source).unwrap();
        let second = registry.resolve_dictionary(&fx.dictionary).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(first.file_path(), fx.dictionary.as_path());
        assert!(registry.is_word_accepted(&fx.source, "tokio"));
    }

    #[tokio::test]
    async fn files_outside_projects_have_no_dictionary() {
        let fx = fixture(&["tokio"]);
        let registry = fx.registry();
        let stray = fx.dir.path().join("notes.txt");

        assert!(registry.resolve_dictionary(&stray).is_none());
        assert!(!registry.is_word_accepted(&stray, "tokio"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unnamed_projects_have_no_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeHost::default();
        let file = dir.path().join("loose.rs");
        fake.projects.add_project(Project::new("", dir.path()));
        fake.projects.include(&file);
        let registry = Registry::new(fake.host(), Config::default(), Handle::current());

        assert!(registry.resolve_dictionary(&file).is_none());
    }

    #[tokio::test]
    async fn renamed_project_keeps_its_dictionary() {
        let fx = fixture(&["tokio"]);
        let registry = fx.registry();
        let before = registry.resolve_dictionary(&fx.source).unwrap();

        let renamed = Project::new("renamed.proj", fx.dir.path());
        fx.fake.projects.rename_project(&fx.project.id, renamed.clone());
        registry.project_renamed(&fx.project.id, &renamed);

        assert!(registry.existing(&fx.project.id).is_none());
        let after = registry.resolve_dictionary(&fx.source).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.project().id, renamed.id);
        assert!(!after.is_disposed());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn removed_project_drops_its_dictionary() {
        let fx = fixture(&["tokio"]);
        let registry = fx.registry();
        let stale = registry.resolve_dictionary(&fx.source).unwrap();

        registry.project_removed(&fx.project.id);
        assert!(stale.is_disposed());
        assert!(registry.existing(&fx.project.id).is_none());

        match registry.resolve_dictionary(&fx.source) {
            Some(fresh) => assert!(!Arc::ptr_eq(&stale, &fresh)),
            None => {}
        }

        fx.fake.projects.remove_project(&fx.project.id);
        registry.project_removed(&fx.project.id);
        assert!(registry.resolve_dictionary(&fx.source).is_none());
    }

    #[tokio::test]
    async fn closing_the_solution_releases_everything() {
        let fx = fixture(&[]);
        let other_root = fx.dir.path().join("lib");
        fs::create_dir(&other_root).unwrap();
        let other_file = other_root.join("lib.rs");
        fx.fake.projects.add_project(Project::new("lib.proj", &other_root));
        fx.fake.projects.include(&other_file);

        let registry = fx.registry();
        let app = registry.resolve_dictionary(&fx.source).unwrap();
        let lib = registry.resolve_dictionary(&other_file).unwrap();
        assert!(!Arc::ptr_eq(&app, &lib));
        assert_eq!(registry.len(), 2);

        registry.solution_closed();
        assert!(registry.is_empty());
        assert!(app.is_disposed() && lib.is_disposed());
    }

    #[tokio::test]
    async fn dictionary_item_events_reload() {
        let fx = fixture(&["a"]);
        let registry = fx.registry();
        let dictionary = registry.resolve_dictionary(&fx.source).unwrap();
        let mut rx = dictionary.subscribe();

        fx.fake.projects.exclude(&fx.dictionary);
        registry.item_removed(&fx.item(&fx.dictionary));
        assert_eq!(rx.try_recv().unwrap(), DictionaryEvent::RecheckAll);

        fx.fake.projects.include(&fx.dictionary);
        registry.item_added(&fx.item(&fx.dictionary));
        assert_eq!(rx.try_recv().unwrap(), DictionaryEvent::WordAdded("a".into()));

        registry.item_added(&fx.item(&fx.source));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn item_events_reset_the_create_prompt() {
        let fx = fixture(&[]);
        let registry = fx.registry();
        let dictionary = registry.resolve_dictionary(&fx.source).unwrap();

        fx.fake.projects.exclude(&fx.dictionary);
        assert!(!dictionary.add_word("first"));
        assert!(!dictionary.add_word("second"));
        assert_eq!(fx.fake.prompt.questions.lock().len(), 1);

        registry.item_removed(&fx.item(&fx.dictionary));
        assert!(!dictionary.add_word("third"));
        assert_eq!(fx.fake.prompt.questions.lock().len(), 2);
    }

    #[tokio::test]
    async fn open_dictionary_buffers_are_connected() {
        let fx = fixture(&["a"]);
        let registry = fx.registry();
        let text = fs::read_to_string(&fx.dictionary).unwrap();

        let source = fx.fake.editor.open(&fx.source, "fn main() {}");
        registry.register_open_buffer(&*source);
        assert_eq!(source.listener_count(), 0);

        let buffer = fx.fake.editor.open(&fx.dictionary, &text);
        registry.register_open_buffer(&*buffer);
        assert_eq!(buffer.listener_count(), 1);

        let dictionary = registry.resolve_dictionary(&fx.source).unwrap();
        let mut rx = dictionary.subscribe();
        buffer.set_text(&codec::insert_word(Some(&text), "typed").unwrap().unwrap());
        buffer.go_idle();
        assert_eq!(rx.try_recv().unwrap(), DictionaryEvent::WordAdded("typed".into()));
    }

    #[tokio::test]
    async fn renaming_the_dictionary_file_reconnects_and_reloads() {
        let fx = fixture(&["a"]);
        let registry = fx.registry();
        let dictionary = registry.resolve_dictionary(&fx.source).unwrap();
        let mut rx = dictionary.subscribe();

        let old = fx.dir.path().join("Words.xml");
        let text = codec::insert_word(Some(&fs::read_to_string(&fx.dictionary).unwrap()), "b")
            .unwrap()
            .unwrap();
        let buffer = fx.fake.editor.open(&fx.dictionary, &text);
        registry.item_renamed(&fx.item(&fx.dictionary), &old);

        assert_eq!(buffer.listener_count(), 1);
        assert_eq!(rx.try_recv().unwrap(), DictionaryEvent::WordAdded("b".into()));

        let unrelated = fx.dir.path().join("other.rs");
        registry.item_renamed(&fx.item(&unrelated), &fx.dir.path().join("old.rs"));
        assert!(rx.try_recv().is_err());
    }
}
