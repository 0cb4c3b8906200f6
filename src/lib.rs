//! Per-project dictionaries of accepted words, kept in sync with an XML file
//! at the project root.

pub mod codec;
pub mod config;
pub mod debounce;
pub mod dictionary;
pub mod error;
pub mod events;
pub mod host;
pub mod lsp;
pub mod registry;
pub mod watcher;

pub use config::{Config, CreatePolicy};
pub use dictionary::{Added, Dictionary, State, WordDiff};
pub use events::{DictionaryEvent, EventBus};
pub use host::{Host, Project, ProjectId, ProjectItem};
pub use registry::Registry;
