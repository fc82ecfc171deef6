use std::sync::Arc;

use snafu::OptionExt;
use tokio_util::sync::CancellationToken;

use gemchat_llm::{ChainReply, ChainRequest, ModelChain};
use gemchat_storage::{ChatSession, Message, MessageId};

use super::error::{
    CancelledSnafu, ChatError, ChatResult, InvalidResponseFormatSnafu, SessionNotFoundSnafu,
};
use super::history::format_history;
use super::store::SessionStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Stored user message whose text is the prompt (an edit, or a prompt
    /// that was appended before submitting). Left out of the history.
    pub edited_message_id: Option<MessageId>,
    /// Data url of an attached image. Accepted but not forwarded.
    pub image: Option<String>,
}

impl SubmitOptions {
    pub fn edit(message_id: MessageId) -> Self {
        Self {
            edited_message_id: Some(message_id),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn is_edited(&self) -> bool {
        self.edited_message_id.is_some()
    }
}

/// Turns the active session plus a new prompt into one chain call.
///
/// The store is only read; the reply is returned for the caller to append.
#[derive(Clone)]
pub struct RoundTrip {
    chain: Arc<dyn ModelChain>,
}

impl RoundTrip {
    pub fn new(chain: Arc<dyn ModelChain>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Arc<dyn ModelChain> {
        &self.chain
    }

    /// Builds the request for `prompt` against the current session.
    pub fn compose_request(
        &self,
        store: &SessionStore,
        prompt: &str,
        options: &SubmitOptions,
    ) -> ChatResult<ChainRequest> {
        let session = store.current_session().context(SessionNotFoundSnafu {
            stage: "resolve-current-session",
            session_id: None::<String>,
        })?;

        if options.image.is_some() {
            tracing::warn!(
                session_id = %session.id,
                "image attached to prompt, but multimodal input is not supported; ignoring it"
            );
        }

        let context = context_for(session, options.edited_message_id.as_ref());
        let history = format_history(context, options.edited_message_id.as_ref());
        Ok(ChainRequest::new(prompt, history))
    }

    pub async fn submit_prompt(
        &self,
        store: &SessionStore,
        prompt: &str,
        options: SubmitOptions,
        cancel: &CancellationToken,
    ) -> ChatResult<Message> {
        let request = self.compose_request(store, prompt, &options)?;
        tracing::debug!(
            chain = %self.chain.id(),
            model_id = %self.chain.model_id(),
            history_len = request.history.len(),
            is_edited = options.is_edited(),
            "calling model chain"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.chain.invoke(request) => Some(outcome),
        };

        // A reply that lands after cancellation is stale and must not reach the store.
        let Some(outcome) = outcome.filter(|_| !cancel.is_cancelled()) else {
            tracing::debug!("round trip cancelled, discarding result");
            return CancelledSnafu {
                stage: "await-chain",
            }
            .fail();
        };

        let reply = match outcome {
            Ok(reply) => reply,
            Err(error) => {
                tracing::error!(error = %error, "model chain invocation failed");
                return Err(ChatError::from_invocation(&error));
            }
        };

        match reply {
            ChainReply::Text(text) => {
                tracing::debug!(reply_len = text.len(), "received model reply");
                Ok(Message::ai(text))
            }
            other => {
                tracing::error!(kind = %other.kind(), "model reply is not a string");
                InvalidResponseFormatSnafu {
                    stage: "validate-reply",
                    kind: other.kind().to_string(),
                }
                .fail()
            }
        }
    }
}

/// Messages that make up the model's context.
///
/// For an edit this is the conversation up to and including the edited
/// message, so replies to the old wording are not fed back in.
fn context_for<'a>(session: &'a ChatSession, edited: Option<&MessageId>) -> &'a [Message] {
    let Some(edited) = edited else {
        return &session.messages;
    };

    match session
        .messages
        .iter()
        .position(|message| &message.id == edited)
    {
        Some(index) => &session.messages[..=index],
        None => &session.messages,
    }
}
