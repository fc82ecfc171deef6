use snafu::Snafu;

use gemchat_llm::ProviderError;
use gemchat_storage::StorageError;

pub const UNAUTHORIZED_REASON: &str = "Unauthorized. Please log in.";
pub const FALLBACK_INVOCATION_REASON: &str = "An unexpected error occurred contacting the AI.";

/// Failures surfaced by chat operations.
///
/// Every variant renders as a short sentence suitable for showing to the
/// user; operations return these instead of panicking so one bad round trip
/// never takes the application down.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("{}", describe_missing_session(session_id.as_deref())))]
    SessionNotFound {
        stage: &'static str,
        session_id: Option<String>,
    },
    #[snafu(display("Message not found for update"))]
    MessageNotFound {
        stage: &'static str,
        message_id: String,
    },
    #[snafu(display("message '{message_id}' was written by the model and cannot be edited"))]
    ReadOnlyMessage {
        stage: &'static str,
        message_id: String,
    },
    #[snafu(display("Received invalid response format from AI."))]
    InvalidResponseFormat { stage: &'static str, kind: String },
    #[snafu(display("{reason}"))]
    ModelInvocation { stage: &'static str, reason: String },
    #[snafu(display("{detail}"))]
    Persistence { stage: &'static str, detail: String },
    #[snafu(display("Unauthorized. Please log in."))]
    Unauthorized { stage: &'static str },
    #[snafu(display("Failed to fetch chats sessions"))]
    SessionLoad { stage: &'static str, detail: String },
    #[snafu(display("an edit of message '{message_id}' is already being submitted"))]
    EditInProgress {
        stage: &'static str,
        message_id: String,
    },
    #[snafu(display("no edited message is waiting for a reply"))]
    NothingToRetry { stage: &'static str },
    #[snafu(display("request was cancelled"))]
    Cancelled { stage: &'static str },
}

impl ChatError {
    /// User-facing failure reason.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub(crate) fn from_invocation(error: &ProviderError) -> Self {
        let reason = error.to_string();
        let reason = if reason.trim().is_empty() {
            FALLBACK_INVOCATION_REASON.to_string()
        } else {
            reason
        };
        Self::ModelInvocation {
            stage: "invoke-chain",
            reason,
        }
    }

    pub(crate) fn from_load(error: &StorageError) -> Self {
        if error.is_unauthorized() {
            return Self::Unauthorized {
                stage: "load-sessions",
            };
        }
        Self::SessionLoad {
            stage: "load-sessions",
            detail: error.to_string(),
        }
    }

    pub(crate) fn from_save(error: &StorageError) -> Self {
        let detail = match error {
            StorageError::SaveStatus { status, body, .. } => {
                format!("Failed to save chat: {status} {body}")
            }
            StorageError::Unauthorized { .. } => "Failed to save chat: 401 Unauthorized".to_string(),
            _ => "Failed to save chat".to_string(),
        };
        Self::Persistence {
            stage: "save-sessions",
            detail,
        }
    }
}

fn describe_missing_session(session_id: Option<&str>) -> &'static str {
    match session_id {
        Some(_) => "Session not found for update",
        None => "No current session found",
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_fetch_uses_login_prompt() {
        let error = ChatError::from_load(&StorageError::Unauthorized {
            stage: "fetch-status",
        });
        assert_eq!(error.reason(), UNAUTHORIZED_REASON);
    }

    #[test]
    fn other_fetch_failures_use_generic_reason() {
        let error = ChatError::from_load(&StorageError::FetchStatus {
            stage: "fetch-status",
            status: 503,
            body: "down".to_string(),
        });
        assert_eq!(error.reason(), "Failed to fetch chats sessions");
        assert!(matches!(error, ChatError::SessionLoad { ref detail, .. } if detail.contains("503")));
    }

    #[test]
    fn save_status_is_carried_in_detail() {
        let error = ChatError::from_save(&StorageError::SaveStatus {
            stage: "save-status",
            status: 500,
            body: "boom".to_string(),
        });
        assert_eq!(error.reason(), "Failed to save chat: 500 boom");
    }

    #[test]
    fn blank_invocation_errors_get_a_reason() {
        let error = ChatError::from_invocation(&ProviderError::Upstream {
            stage: "test",
            message: "  ".to_string(),
        });
        assert_eq!(error.reason(), FALLBACK_INVOCATION_REASON);
    }
}
