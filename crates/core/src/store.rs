use snafu::{OptionExt, ensure};

use gemchat_storage::{ChatSession, Message, MessageId, MessageText, Sender, SessionId};

use super::error::{ChatResult, MessageNotFoundSnafu, ReadOnlyMessageSnafu, SessionNotFoundSnafu};

/// Lifecycle of the most recent load or round trip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed(String),
}

impl RequestStatus {
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// In-memory owner of every session and message.
///
/// All writes go through the `&mut self` methods below; readers get shared
/// borrows or cloned snapshots. Text is coerced to a plain string on every
/// path into the store.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Vec<ChatSession>,
    current_session_id: Option<SessionId>,
    status: RequestStatus,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(sessions: Vec<ChatSession>) -> Self {
        let mut store = Self::new();
        store.replace_sessions(sessions);
        store
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn snapshot(&self) -> Vec<ChatSession> {
        self.sessions.clone()
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|session| &session.id == session_id)
    }

    pub fn current_session_id(&self) -> Option<&SessionId> {
        self.current_session_id.as_ref()
    }

    pub fn current_session(&self) -> Option<&ChatSession> {
        self.current_session_id
            .as_ref()
            .and_then(|session_id| self.session(session_id))
    }

    pub fn request_status(&self) -> &RequestStatus {
        &self.status
    }

    pub fn set_request_status(&mut self, status: RequestStatus) {
        self.status = status;
    }

    /// Swaps in a freshly loaded collection and returns how many message
    /// texts had to be coerced.
    pub fn replace_sessions(&mut self, mut sessions: Vec<ChatSession>) -> usize {
        let mut coerced = 0;
        for session in &mut sessions {
            for message in &mut session.messages {
                if !message.text.is_plain() {
                    tracing::warn!(
                        session_id = %session.id,
                        message_id = %message.id,
                        "coercing non-string message text on load"
                    );
                    message.text = std::mem::take(&mut message.text).into_plain();
                    coerced += 1;
                }
            }
        }

        self.sessions = sessions;
        if let Some(current) = &self.current_session_id
            && self.session(current).is_none()
        {
            self.current_session_id = None;
        }
        coerced
    }

    pub fn select_session(&mut self, session_id: &SessionId) -> ChatResult<()> {
        ensure!(
            self.session(session_id).is_some(),
            SessionNotFoundSnafu {
                stage: "select-session",
                session_id: Some(session_id.to_string()),
            }
        );
        self.current_session_id = Some(session_id.clone());
        Ok(())
    }

    pub fn create_session(&mut self) -> SessionId {
        let session_id = SessionId::generate();
        self.sessions.push(ChatSession::new(session_id.clone()));
        self.current_session_id = Some(session_id.clone());
        session_id
    }

    pub fn append_message(&mut self, session_id: &SessionId, mut message: Message) -> ChatResult<()> {
        message.text = message.text.into_plain();
        let session = self.session_mut(session_id, "append-message")?;
        session.messages.push(message);
        Ok(())
    }

    /// Rewrites the text of a user message in place.
    pub fn update_message_text(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
        text: impl Into<String>,
    ) -> ChatResult<()> {
        let session = self.session_mut(session_id, "update-message-text")?;
        let message = session
            .messages
            .iter_mut()
            .find(|message| &message.id == message_id)
            .context(MessageNotFoundSnafu {
                stage: "update-message-text",
                message_id: message_id.to_string(),
            })?;
        ensure!(
            message.sender == Sender::User,
            ReadOnlyMessageSnafu {
                stage: "update-message-text",
                message_id: message_id.to_string(),
            }
        );

        message.text = MessageText::Plain(text.into());
        Ok(())
    }

    fn session_mut(
        &mut self,
        session_id: &SessionId,
        stage: &'static str,
    ) -> ChatResult<&mut ChatSession> {
        self.sessions
            .iter_mut()
            .find(|session| &session.id == session_id)
            .context(SessionNotFoundSnafu {
                stage,
                session_id: Some(session_id.to_string()),
            })
    }
}
