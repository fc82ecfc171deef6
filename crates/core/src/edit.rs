use snafu::{OptionExt, ensure};
use tokio_util::sync::CancellationToken;

use gemchat_storage::{Message, MessageId, Sender, SessionBackend, SessionId};

use super::error::{
    ChatResult, EditInProgressSnafu, MessageNotFoundSnafu, NothingToRetrySnafu,
    ReadOnlyMessageSnafu, SessionNotFoundSnafu,
};
use super::persistence::save_sessions;
use super::roundtrip::{RoundTrip, SubmitOptions};
use super::store::{RequestStatus, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditState {
    #[default]
    Idle,
    Editing {
        message_id: MessageId,
        draft: String,
    },
    Submitting {
        session_id: SessionId,
        message_id: MessageId,
    },
}

/// Edited text that is stored but still has no regenerated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRegeneration {
    pub session_id: SessionId,
    pub message_id: MessageId,
    pub text: String,
}

/// Collaborators an edit needs while it is being submitted.
pub struct EditContext<'a> {
    pub store: &'a mut SessionStore,
    pub round_trip: &'a RoundTrip,
    pub backend: &'a dyn SessionBackend,
    pub cancel: &'a CancellationToken,
}

/// Edit-and-regenerate state machine for one conversation view.
///
/// `Idle -> Editing -> Submitting -> Idle`. A failed submit returns to
/// `Idle` with the reason kept in [`EditFlow::last_error`]; the edited text
/// stays committed and can be regenerated with
/// [`EditFlow::retry_regeneration`].
#[derive(Debug, Clone, Default)]
pub struct EditFlow {
    state: EditState,
    last_error: Option<String>,
    pending: Option<PendingRegeneration>,
}

impl EditFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn pending_regeneration(&self) -> Option<&PendingRegeneration> {
        self.pending.as_ref()
    }

    pub fn draft(&self) -> Option<&str> {
        match &self.state {
            EditState::Editing { draft, .. } => Some(draft),
            _ => None,
        }
    }

    pub fn begin_edit(
        &mut self,
        message_id: MessageId,
        current_text: impl Into<String>,
    ) -> ChatResult<()> {
        self.ensure_not_submitting("begin-edit")?;
        self.state = EditState::Editing {
            message_id,
            draft: current_text.into(),
        };
        Ok(())
    }

    /// Replaces the scratch text; ignored unless an edit is open.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        if let EditState::Editing { draft, .. } = &mut self.state {
            *draft = text.into();
        }
    }

    /// Drops the scratch state. Also clears a submit whose future was dropped.
    pub fn cancel_edit(&mut self) {
        self.state = EditState::Idle;
    }

    /// Commits `new_text` to the message, regenerates a reply and saves.
    pub async fn save_edit(
        &mut self,
        ctx: EditContext<'_>,
        session_id: &SessionId,
        message_id: &MessageId,
        new_text: impl Into<String>,
    ) -> ChatResult<Message> {
        self.ensure_not_submitting("save-edit")?;
        let new_text = new_text.into();
        check_editable(ctx.store, session_id, message_id)?;

        // The new wording is kept even when regeneration fails.
        ctx.store
            .update_message_text(session_id, message_id, new_text.clone())?;
        self.pending = Some(PendingRegeneration {
            session_id: session_id.clone(),
            message_id: message_id.clone(),
            text: new_text,
        });

        self.regenerate(ctx).await
    }

    /// Re-runs the round trip for an edit whose reply never arrived.
    pub async fn retry_regeneration(&mut self, ctx: EditContext<'_>) -> ChatResult<Message> {
        self.ensure_not_submitting("retry-regeneration")?;
        let pending = self.pending.clone().context(NothingToRetrySnafu {
            stage: "retry-regeneration",
        })?;
        check_editable(ctx.store, &pending.session_id, &pending.message_id)?;

        self.regenerate(ctx).await
    }

    async fn regenerate(&mut self, ctx: EditContext<'_>) -> ChatResult<Message> {
        let Some(pending) = self.pending.clone() else {
            return NothingToRetrySnafu {
                stage: "regenerate",
            }
            .fail();
        };

        self.state = EditState::Submitting {
            session_id: pending.session_id.clone(),
            message_id: pending.message_id.clone(),
        };
        self.last_error = None;
        ctx.store.set_request_status(RequestStatus::Loading);

        let requested =
            Self::request_reply(ctx.store, ctx.round_trip, ctx.cancel, &pending).await;
        let outcome = match requested {
            Ok(reply) => {
                // The reply is stored; a failed save only needs a plain re-save.
                self.pending = None;
                save_sessions(ctx.backend, ctx.store.sessions())
                    .await
                    .map(|()| reply)
            }
            Err(error) => Err(error),
        };
        self.state = EditState::Idle;

        match outcome {
            Ok(reply) => {
                ctx.store.set_request_status(RequestStatus::Succeeded);
                Ok(reply)
            }
            Err(error) if error.is_cancelled() => {
                ctx.store.set_request_status(RequestStatus::Idle);
                Err(error)
            }
            Err(error) => {
                tracing::warn!(
                    session_id = %pending.session_id,
                    message_id = %pending.message_id,
                    error = %error,
                    "edit regeneration failed"
                );
                let reason = error.reason();
                self.last_error = Some(reason.clone());
                ctx.store.set_request_status(RequestStatus::Failed(reason));
                Err(error)
            }
        }
    }

    async fn request_reply(
        store: &mut SessionStore,
        round_trip: &RoundTrip,
        cancel: &CancellationToken,
        pending: &PendingRegeneration,
    ) -> ChatResult<Message> {
        store.select_session(&pending.session_id)?;
        let reply = round_trip
            .submit_prompt(
                store,
                &pending.text,
                SubmitOptions::edit(pending.message_id.clone()),
                cancel,
            )
            .await?;

        store.append_message(&pending.session_id, reply.clone())?;
        Ok(reply)
    }

    fn ensure_not_submitting(&self, stage: &'static str) -> ChatResult<()> {
        if let EditState::Submitting { message_id, .. } = &self.state {
            return EditInProgressSnafu {
                stage,
                message_id: message_id.to_string(),
            }
            .fail();
        }
        Ok(())
    }
}

fn check_editable(
    store: &SessionStore,
    session_id: &SessionId,
    message_id: &MessageId,
) -> ChatResult<()> {
    let session = store.session(session_id).context(SessionNotFoundSnafu {
        stage: "check-editable",
        session_id: Some(session_id.to_string()),
    })?;
    let message = session.message(message_id).context(MessageNotFoundSnafu {
        stage: "check-editable",
        message_id: message_id.to_string(),
    })?;
    ensure!(
        message.sender == Sender::User,
        ReadOnlyMessageSnafu {
            stage: "check-editable",
            message_id: message_id.to_string(),
        }
    );
    Ok(())
}
