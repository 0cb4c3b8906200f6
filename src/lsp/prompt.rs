use std::collections::HashMap;

use log::{debug, warn};
use tokio::runtime::Handle;
use tower_lsp::lsp_types::{MessageActionItem, MessageType};
use tower_lsp::Client;

use crate::config::CreatePolicy;
use crate::host::Prompt;

const YES: &str = "Yes";
const NO: &str = "No";

/// Asks the user through `window/showMessageRequest`.
///
/// `confirm` blocks until the client answers, so it must only be called
/// from a blocking thread, never from a runtime worker.
pub struct ClientPrompt {
    client: Client,
    runtime: Handle,
    policy: CreatePolicy,
}

impl ClientPrompt {
    pub fn new(client: Client, runtime: Handle, policy: CreatePolicy) -> Self {
        Self {
            client,
            runtime,
            policy,
        }
    }

    fn ask(&self, title: &str, question: &str) -> bool {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let message = format!("{title}: {question}");

        self.runtime.spawn(async move {
            let actions = [YES, NO]
                .iter()
                .map(|title| MessageActionItem {
                    title: title.to_string(),
                    properties: HashMap::new(),
                })
                .collect();
            let answer = match client
                .show_message_request(MessageType::INFO, message, Some(actions))
                .await
            {
                Ok(Some(item)) => item.title == YES,
                Ok(None) => false,
                Err(err) => {
                    warn!("prompt failed: {err}");
                    false
                }
            };
            let _ = tx.send(answer);
        });

        let answer = rx.recv().unwrap_or(false);
        debug!("{question:?} answered {answer}");
        answer
    }
}

impl Prompt for ClientPrompt {
    fn confirm(&self, title: &str, question: &str) -> bool {
        match self.policy {
            CreatePolicy::Always => true,
            CreatePolicy::Never => false,
            CreatePolicy::Ask => self.ask(title, question),
        }
    }

    fn show_error(&self, title: &str, message: &str) {
        let client = self.client.clone();
        let text = format!("{title}: {message}");
        self.runtime.spawn(async move {
            client.show_message(MessageType::ERROR, text).await;
        });
    }
}
