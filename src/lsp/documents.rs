//! Open documents, mirrored from the client.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crop::Rope;
use dashmap::DashMap;
use log::debug;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tower_lsp::lsp_types::{Position, Range as LspRange, TextDocumentContentChangeEvent, TextEdit, Url};

use crate::debounce::Debouncer;
use crate::error::HostError;
use crate::host::{EditorSurface, IdleListener, Subscription, TextBuffer};

/// Where edits to an open document are sent. The client applies them and
/// reports the result back as an ordinary change.
pub type EditSink = Arc<dyn Fn(Url, TextEdit) + Send + Sync>;

type Listeners = Arc<Mutex<Vec<(u64, Arc<IdleListener>)>>>;

pub struct Document {
    uri: Url,
    path: PathBuf,
    rope: RwLock<Rope>,
    version: AtomicI32,
    listeners: Listeners,
    next_listener: AtomicU64,
    idle: Debouncer,
    sink: EditSink,
}

impl Document {
    fn new(
        uri: Url,
        path: PathBuf,
        text: &str,
        version: i32,
        runtime: Handle,
        idle_delay: Duration,
        sink: EditSink,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Document>| {
            let weak = weak.clone();
            Document {
                uri,
                path,
                rope: RwLock::new(Rope::from(text)),
                version: AtomicI32::new(version),
                listeners: Arc::new(Mutex::new(Vec::new())),
                next_listener: AtomicU64::new(0),
                idle: Debouncer::new(runtime, idle_delay, move || {
                    if let Some(document) = weak.upgrade() {
                        document.went_idle();
                    }
                }),
                sink,
            }
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn version(&self) -> i32 {
        self.version.load(Ordering::SeqCst)
    }

    fn apply(&self, version: i32, changes: Vec<TextDocumentContentChangeEvent>) {
        {
            let mut rope = self.rope.write();
            for change in changes {
                match change.range {
                    Some(range) => {
                        let start = offset_of(&rope, range.start);
                        let end = offset_of(&rope, range.end).max(start);
                        rope.replace(start..end, &change.text);
                    }
                    None => *rope = Rope::from(change.text.as_str()),
                }
            }
        }
        self.version.store(version, Ordering::SeqCst);
        self.idle.signal();
    }

    fn went_idle(&self) {
        let listeners: Vec<_> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        debug!("{} idle, {} listeners", self.uri, listeners.len());
        for listener in listeners {
            (*listener)(self as &dyn TextBuffer);
        }
    }
}

impl TextBuffer for Document {
    fn file_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn text(&self) -> String {
        self.rope.read().to_string()
    }

    fn edit(&self, range: Range<usize>, text: &str) -> Result<(), HostError> {
        let range = {
            let rope = self.rope.read();
            if range.end > rope.byte_len() || range.start > range.end {
                return Err(HostError::new(format!("edit {range:?} is outside {}", self.uri)));
            }
            LspRange::new(position_of(&rope, range.start), position_of(&rope, range.end))
        };
        (self.sink)(
            self.uri.clone(),
            TextEdit {
                range,
                new_text: text.to_string(),
            },
        );
        Ok(())
    }

    fn on_idle(&self, listener: IdleListener) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push((id, Arc::new(listener)));
        let listeners = self.listeners.clone();
        Subscription::new(move || listeners.lock().retain(|(i, _)| *i != id))
    }
}

/// Byte offset of an LSP position (UTF-16 columns), clamped to the text.
fn offset_of(rope: &Rope, position: Position) -> usize {
    let line = position.line as usize;
    if line >= rope.line_len() {
        return rope.byte_len();
    }
    let start = rope.byte_of_line(line);
    let mut units = 0;
    let mut bytes = 0;
    for c in rope.line(line).chars() {
        if units >= position.character as usize {
            break;
        }
        units += c.len_utf16();
        bytes += c.len_utf8();
    }
    start + bytes
}

fn position_of(rope: &Rope, offset: usize) -> Position {
    let offset = offset.min(rope.byte_len());
    let line = rope.line_of_byte(offset);
    let start = rope.byte_of_line(line);
    let character: usize = rope
        .byte_slice(start..offset)
        .chars()
        .map(char::len_utf16)
        .sum();
    Position::new(line as u32, character as u32)
}

pub struct Documents {
    open: DashMap<PathBuf, Arc<Document>>,
    runtime: Handle,
    idle_delay: Duration,
    sink: EditSink,
}

impl Documents {
    pub fn new(runtime: Handle, idle_delay: Duration, sink: EditSink) -> Self {
        Self {
            open: DashMap::new(),
            runtime,
            idle_delay,
            sink,
        }
    }

    pub fn open(&self, uri: Url, text: &str, version: i32) -> Option<Arc<Document>> {
        let path = uri.to_file_path().ok()?;
        let document = Document::new(
            uri,
            path.clone(),
            text,
            version,
            self.runtime.clone(),
            self.idle_delay,
            self.sink.clone(),
        );
        self.open.insert(path, document.clone());
        Some(document)
    }

    pub fn change(&self, uri: &Url, version: i32, changes: Vec<TextDocumentContentChangeEvent>) {
        let Some(document) = uri.to_file_path().ok().and_then(|p| self.get(&p)) else {
            debug!("change for unknown document {uri}");
            return;
        };
        document.apply(version, changes);
    }

    pub fn close(&self, uri: &Url) -> Option<Arc<Document>> {
        let path = uri.to_file_path().ok()?;
        self.open.remove(&path).map(|(_, document)| document)
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Document>> {
        self.open.get(path).map(|d| d.value().clone())
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.open.contains_key(path)
    }
}

impl EditorSurface for Documents {
    fn open_buffer(&self, path: &Path) -> Option<Arc<dyn TextBuffer>> {
        let document = self.get(path)?;
        Some(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn change(range: Option<((u32, u32), (u32, u32))>, text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: range.map(|((l1, c1), (l2, c2))| LspRange::new(Position::new(l1, c1), Position::new(l2, c2))),
            range_length: None,
            text: text.to_string(),
        }
    }

    fn documents() -> (Documents, Arc<Mutex<Vec<TextEdit>>>) {
        let edits = Arc::new(Mutex::new(Vec::new()));
        let sent = edits.clone();
        let sink: EditSink = Arc::new(move |_: Url, edit: TextEdit| sent.lock().push(edit));
        let documents = Documents::new(Handle::current(), Duration::from_millis(500), sink);
        (documents, edits)
    }

    fn uri(dir: &Path, name: &str) -> Url {
        Url::from_file_path(dir.join(name)).unwrap()
    }

    #[test]
    fn converts_between_offsets_and_positions() {
        let rope = Rope::from("ab\nnaïve 😀x\n");
        assert_eq!(offset_of(&rope, Position::new(0, 1)), 1);
        assert_eq!(offset_of(&rope, Position::new(1, 3)), 3 + "naï".len());
        assert_eq!(offset_of(&rope, Position::new(1, 8)), 3 + "naïve 😀".len());
        assert_eq!(offset_of(&rope, Position::new(7, 0)), rope.byte_len());

        assert_eq!(position_of(&rope, 3 + "naïve 😀".len()), Position::new(1, 8));
        assert_eq!(position_of(&rope, 0), Position::new(0, 0));
    }

    #[tokio::test]
    async fn applies_incremental_and_full_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (documents, _) = documents();
        let uri = uri(dir.path(), "a.txt");
        let document = documents.open(uri.clone(), "hello world\n", 1).unwrap();

        documents.change(&uri, 2, vec![change(Some(((0, 6), (0, 11))), "rope")]);
        assert_eq!(document.text(), "hello rope\n");
        assert_eq!(document.version(), 2);

        documents.change(&uri, 3, vec![change(None, "fresh")]);
        assert_eq!(document.text(), "fresh");

        let path = uri.to_file_path().unwrap();
        assert!(documents.open_buffer(&path).is_some());
        assert!(documents.close(&uri).is_some());
        assert!(!documents.is_open(&path));
    }

    #[tokio::test]
    async fn edits_are_forwarded_as_lsp_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let (documents, edits) = documents();
        let document = documents.open(uri(dir.path(), "d.xml"), "<a>\n\t</a>\n", 1).unwrap();

        document.edit(4..4, "\t<b/>\n").unwrap();
        assert_eq!(
            *edits.lock(),
            vec![TextEdit {
                range: LspRange::new(Position::new(1, 0), Position::new(1, 0)),
                new_text: "\t<b/>\n".to_string(),
            }]
        );
        // The local copy waits for the client's change notification.
        assert_eq!(document.text(), "<a>\n\t</a>\n");
        assert!(document.edit(0..100, "x").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_run_once_typing_pauses() {
        let dir = tempfile::tempdir().unwrap();
        let (documents, _) = documents();
        let uri = uri(dir.path(), "d.xml");
        let document = documents.open(uri.clone(), "", 1).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let subscription = document.on_idle(Box::new(move |buffer| {
            assert!(buffer.text().starts_with("abc"));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        for (i, c) in ["a", "b", "c"].iter().enumerate() {
            let col = i as u32;
            documents.change(&uri, 2 + i as i32, vec![change(Some(((0, col), (0, col))), c)]);
            sleep(Duration::from_millis(100)).await;
        }
        sleep(Duration::from_millis(600)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        drop(subscription);
        documents.change(&uri, 9, vec![change(Some(((0, 3), (0, 3))), "d")]);
        sleep(Duration::from_millis(600)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
