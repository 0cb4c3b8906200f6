use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::config::Config;
use crate::dictionary::Dictionary;
use crate::events::DictionaryEvent;
use crate::host::{Host, ProjectItem, TextBuffer};
use crate::lsp::documents::{Documents, EditSink};
use crate::lsp::prompt::ClientPrompt;
use crate::lsp::workspace::Workspace;
use crate::registry::Registry;

pub const ADD_WORD: &str = "projdict.addWord";
pub const IGNORE_WORD: &str = "projdict.ignoreWord";
pub const IS_ACCEPTED: &str = "projdict/isAccepted";

#[derive(Debug, Deserialize, Serialize)]
pub struct WordParams {
    pub uri: Url,
    pub word: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DictionaryChangedParams {
    /// The dictionary file.
    pub uri: Url,
    /// The word that became accepted; absent when everything needs a recheck.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

pub enum DictionaryChanged {}

impl Notification for DictionaryChanged {
    type Params = DictionaryChangedParams;
    const METHOD: &'static str = "projdict/dictionaryChanged";
}

pub struct Backend {
    client: Client,
    registry: Arc<Registry>,
    workspace: Arc<Workspace>,
    documents: Arc<Documents>,
}

impl Backend {
    pub fn new(client: Client, config: Config) -> Self {
        let runtime = Handle::current();

        let documents = Arc::new(Documents::new(
            runtime.clone(),
            config.idle_delay(),
            apply_edits(client.clone(), runtime.clone()),
        ));
        let workspace = Arc::new(Workspace::new(documents.clone()));
        let prompt = Arc::new(ClientPrompt::new(
            client.clone(),
            runtime.clone(),
            config.create_dictionary,
        ));
        let host = Host {
            projects: workspace.clone(),
            editor: documents.clone(),
            prompt,
        };

        let forward_client = client.clone();
        let forward_runtime = runtime.clone();
        let registry = Registry::new(host, config, runtime).on_dictionary_created(move |dictionary| {
            forward_events(forward_client.clone(), &forward_runtime, dictionary)
        });

        Self {
            client,
            registry: Arc::new(registry),
            workspace,
            documents,
        }
    }

    pub async fn is_accepted(&self, params: WordParams) -> Result<bool> {
        let path = file_path(&params.uri)?;
        Ok(self.registry.is_word_accepted(&path, &params.word))
    }

    fn item(&self, uri: &str) -> Option<ProjectItem> {
        let path = Url::parse(uri).ok()?.to_file_path().ok()?;
        let project = self.workspace.folder_of(&path)?;
        Some(ProjectItem { project, path })
    }

    async fn add_word(&self, path: PathBuf, word: String) -> Result<bool> {
        // The create prompt waits for the client, so keep it off the workers
        // that deliver the client's answer.
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || {
            registry
                .resolve_dictionary(&path)
                .is_some_and(|dictionary| dictionary.add_word(&word))
        })
        .await
        .map_err(|e| {
            warn!("add word task failed: {e}");
            Error::internal_error()
        })
    }
}

fn file_path(uri: &Url) -> Result<PathBuf> {
    uri.to_file_path()
        .map_err(|_| Error::invalid_params(format!("{uri} is not a file")))
}

fn apply_edits(client: Client, runtime: Handle) -> EditSink {
    Arc::new(move |uri: Url, edit: TextEdit| {
        let client = client.clone();
        runtime.spawn(async move {
            let changes = HashMap::from([(uri, vec![edit])]);
            let edit = WorkspaceEdit {
                changes: Some(changes),
                ..Default::default()
            };
            match client.apply_edit(edit).await {
                Ok(res) if res.applied => debug!("dictionary edit applied"),
                Ok(_) => warn!("client rejected dictionary edit"),
                Err(err) => warn!("dictionary edit failed: {err}"),
            }
        });
    })
}

fn forward_events(client: Client, runtime: &Handle, dictionary: &Arc<Dictionary>) {
    let Ok(uri) = Url::from_file_path(dictionary.file_path()) else {
        return;
    };
    let mut events = dictionary.subscribe();
    runtime.spawn(async move {
        loop {
            let word = match events.recv().await {
                Ok(DictionaryEvent::WordAdded(word)) => Some(word),
                Ok(DictionaryEvent::RecheckAll) => None,
                // Missed events could have been removals.
                Err(RecvError::Lagged(_)) => None,
                Err(RecvError::Closed) => break,
            };
            client
                .send_notification::<DictionaryChanged>(DictionaryChangedParams {
                    uri: uri.clone(),
                    word,
                })
                .await;
        }
    });
}

fn word_argument(arguments: Vec<Value>) -> Result<(Url, String)> {
    serde_json::from_value(Value::Array(arguments))
        .map_err(|e| Error::invalid_params(format!("expected [uri, word]: {e}")))
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        #[allow(deprecated)]
        let folders = params.workspace_folders.unwrap_or_else(|| {
            params
                .root_uri
                .map(|uri| {
                    vec![WorkspaceFolder {
                        name: uri.to_string(),
                        uri,
                    }]
                })
                .unwrap_or_default()
        });
        for folder in &folders {
            self.workspace.add_folder(folder);
        }

        let every_file = FileOperationRegistrationOptions {
            filters: vec![FileOperationFilter {
                scheme: Some("file".to_string()),
                pattern: FileOperationPattern {
                    glob: "**/*".to_string(),
                    matches: None,
                    options: None,
                },
            }],
        };

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            offset_encoding: None,
            capabilities: ServerCapabilities {
                code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![ADD_WORD.to_string(), IGNORE_WORD.to_string()],
                    work_done_progress_options: Default::default(),
                }),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: Some(WorkspaceFileOperationsServerCapabilities {
                        did_create: Some(every_file.clone()),
                        did_rename: Some(every_file.clone()),
                        did_delete: Some(every_file),
                        ..Default::default()
                    }),
                }),
                ..ServerCapabilities::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let folders = self.workspace.folders().len();
        info!("initialized with {folders} workspace folders");
        self.client
            .log_message(MessageType::INFO, format!("projdict watching {folders} folders"))
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.registry.solution_closed();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        if let Some(buffer) = self
            .documents
            .open(document.uri, &document.text, document.version)
        {
            self.registry.register_open_buffer(&*buffer);
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        self.documents.change(
            &params.text_document.uri,
            params.text_document.version,
            params.content_changes,
        );
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Some(buffer) = self.documents.close(&params.text_document.uri) else {
            return;
        };
        let path = buffer.file_path();
        if !self.registry.is_dictionary_file(&path) {
            return;
        }
        // Unsaved edits are gone; go back to what is on disk.
        if let Some(dictionary) = self.registry.resolve_dictionary(&path) {
            if let Err(e) = dictionary.reload(false) {
                debug!("reload after close failed: {e}");
            }
        }
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        for folder in &params.event.removed {
            if let Some(project) = self.workspace.remove_folder(folder) {
                self.registry.project_removed(&project.id);
            }
        }
        for folder in &params.event.added {
            self.workspace.add_folder(folder);
        }
    }

    async fn did_create_files(&self, params: CreateFilesParams) {
        for item in params.files.iter().filter_map(|f| self.item(&f.uri)) {
            self.registry.item_added(&item);
        }
    }

    async fn did_delete_files(&self, params: DeleteFilesParams) {
        for item in params.files.iter().filter_map(|f| self.item(&f.uri)) {
            self.registry.item_removed(&item);
        }
    }

    async fn did_rename_files(&self, params: RenameFilesParams) {
        for file in &params.files {
            let Some(item) = self.item(&file.new_uri) else {
                continue;
            };
            let Some(old_path) = Url::parse(&file.old_uri)
                .ok()
                .and_then(|u| u.to_file_path().ok())
            else {
                continue;
            };
            self.registry.item_renamed(&item, &old_path);
        }
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = params.text_document.uri;
        let actions = params
            .context
            .diagnostics
            .iter()
            .filter_map(|d| match &d.code {
                Some(NumberOrString::String(word)) => Some((d, word)),
                _ => None,
            })
            .flat_map(|(diagnostic, word)| {
                [
                    (ADD_WORD, format!("Add \"{word}\" to project dictionary")),
                    (IGNORE_WORD, format!("Ignore \"{word}\"")),
                ]
                .into_iter()
                .map(|(command, title)| {
                    CodeActionOrCommand::CodeAction(CodeAction {
                        title: title.clone(),
                        kind: Some(CodeActionKind::QUICKFIX),
                        diagnostics: Some(vec![diagnostic.clone()]),
                        command: Some(Command {
                            title,
                            command: command.to_string(),
                            arguments: Some(vec![
                                Value::String(uri.to_string()),
                                Value::String(word.clone()),
                            ]),
                        }),
                        ..Default::default()
                    })
                })
                .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        if actions.is_empty() {
            return Ok(None);
        }
        Ok(Some(actions))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        debug!("command {}", params.command);
        let (uri, word) = word_argument(params.arguments)?;
        let path = file_path(&uri)?;

        let done = match params.command.as_str() {
            ADD_WORD => self.add_word(path, word).await?,
            IGNORE_WORD => self
                .registry
                .resolve_dictionary(&path)
                .is_some_and(|dictionary| dictionary.ignore_word(&word)),
            _ => return Err(Error::method_not_found()),
        };
        Ok(Some(Value::Bool(done)))
    }
}
