use std::sync::Arc;

use snafu::OptionExt;
use tokio_util::sync::CancellationToken;

use gemchat_llm::ModelChain;
use gemchat_storage::{Message, MessageId, SessionBackend, SessionId};

use super::edit::{EditContext, EditFlow};
use super::error::{ChatResult, MessageNotFoundSnafu, SessionNotFoundSnafu};
use super::persistence::{load_sessions, save_sessions};
use super::roundtrip::{RoundTrip, SubmitOptions};
use super::store::{RequestStatus, SessionStore};

/// Owns one conversation view: the session store, the model chain, the
/// session backend and the edit state machine.
///
/// Operations take `&mut self`, so a view runs at most one round trip at a
/// time. [`ChatController::cancellation`] hands out the token that aborts the
/// next or running one; once cancelled it is replaced on the next call.
pub struct ChatController {
    store: SessionStore,
    round_trip: RoundTrip,
    backend: Arc<dyn SessionBackend>,
    edits: EditFlow,
    cancel: CancellationToken,
}

impl ChatController {
    pub fn new(chain: Arc<dyn ModelChain>, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            store: SessionStore::new(),
            round_trip: RoundTrip::new(chain),
            backend,
            edits: EditFlow::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn edits(&self) -> &EditFlow {
        &self.edits
    }

    pub fn backend(&self) -> &Arc<dyn SessionBackend> {
        &self.backend
    }

    pub fn cancellation(&mut self) -> CancellationToken {
        self.fresh_token()
    }

    /// Replaces the store contents with what the backend holds.
    pub async fn load(&mut self) -> ChatResult<usize> {
        self.store.set_request_status(RequestStatus::Loading);
        match load_sessions(self.backend.as_ref()).await {
            Ok(sessions) => {
                let coerced = self.store.replace_sessions(sessions);
                if coerced > 0 {
                    tracing::warn!(coerced, "loaded sessions contained non-string text");
                }
                self.store.set_request_status(RequestStatus::Succeeded);
                Ok(self.store.sessions().len())
            }
            Err(error) => {
                self.store
                    .set_request_status(RequestStatus::Failed(error.reason()));
                Err(error)
            }
        }
    }

    pub fn create_session(&mut self) -> SessionId {
        let session_id = self.store.create_session();
        tracing::info!(session_id = %session_id, "created session");
        session_id
    }

    pub fn select_session(&mut self, session_id: &SessionId) -> ChatResult<()> {
        self.store.select_session(session_id)
    }

    /// Appends `prompt` as a user message to the current session and then
    /// appends the model's reply.
    ///
    /// The user message stays in the session when the round trip fails.
    /// Saving is left to the caller.
    pub async fn send_prompt(&mut self, prompt: &str, image: Option<String>) -> ChatResult<Message> {
        let cancel = self.fresh_token();
        let session_id = self
            .store
            .current_session_id()
            .cloned()
            .context(SessionNotFoundSnafu {
                stage: "send-prompt",
                session_id: None::<String>,
            })?;

        let user_message = Message::user(prompt);
        let mut options = SubmitOptions::edit(user_message.id.clone());
        options.image = image;
        self.store.append_message(&session_id, user_message)?;
        self.store.set_request_status(RequestStatus::Loading);

        let outcome = self
            .round_trip
            .submit_prompt(&self.store, prompt, options, &cancel)
            .await;

        match outcome {
            Ok(reply) => {
                self.store.append_message(&session_id, reply.clone())?;
                self.store.set_request_status(RequestStatus::Succeeded);
                Ok(reply)
            }
            Err(error) if error.is_cancelled() => {
                self.store.set_request_status(RequestStatus::Idle);
                Err(error)
            }
            Err(error) => {
                tracing::warn!(session_id = %session_id, error = %error, "prompt round trip failed");
                self.store
                    .set_request_status(RequestStatus::Failed(error.reason()));
                Err(error)
            }
        }
    }

    /// Opens an edit of `message_id` in the current session, seeded with its
    /// stored text.
    pub fn begin_edit(&mut self, message_id: &MessageId) -> ChatResult<()> {
        let session = self
            .store
            .current_session()
            .context(SessionNotFoundSnafu {
                stage: "begin-edit",
                session_id: None::<String>,
            })?;
        let message = session.message(message_id).context(MessageNotFoundSnafu {
            stage: "begin-edit",
            message_id: message_id.to_string(),
        })?;
        let current = message.text.to_plain_string().into_owned();
        self.edits.begin_edit(message_id.clone(), current)
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.edits.set_draft(text);
    }

    pub fn cancel_edit(&mut self) {
        self.cancel.cancel();
        self.edits.cancel_edit();
    }

    pub async fn save_edit(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
        new_text: impl Into<String>,
    ) -> ChatResult<Message> {
        let cancel = self.fresh_token();
        let ctx = EditContext {
            store: &mut self.store,
            round_trip: &self.round_trip,
            backend: self.backend.as_ref(),
            cancel: &cancel,
        };
        self.edits
            .save_edit(ctx, session_id, message_id, new_text)
            .await
    }

    /// Regenerates the reply for the last edit that failed.
    pub async fn retry_last_edit(&mut self) -> ChatResult<Message> {
        let cancel = self.fresh_token();
        let ctx = EditContext {
            store: &mut self.store,
            round_trip: &self.round_trip,
            backend: self.backend.as_ref(),
            cancel: &cancel,
        };
        self.edits.retry_regeneration(ctx).await
    }

    /// Writes every session back to the backend.
    pub async fn save(&self) -> ChatResult<()> {
        save_sessions(self.backend.as_ref(), self.store.sessions()).await
    }

    fn fresh_token(&mut self) -> CancellationToken {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.cancel.clone()
    }
}
