use gemchat_storage::{ChatSession, SessionBackend};

use super::error::{ChatError, ChatResult};

pub fn malformed_text_count(sessions: &[ChatSession]) -> usize {
    sessions
        .iter()
        .map(ChatSession::malformed_message_count)
        .sum()
}

/// Writes the whole collection back in one request.
///
/// Non-string message text is reported but does not block the save.
pub async fn save_sessions(
    backend: &dyn SessionBackend,
    sessions: &[ChatSession],
) -> ChatResult<()> {
    let malformed = malformed_text_count(sessions);
    if malformed > 0 {
        tracing::error!(
            backend = %backend.name(),
            malformed_message_count = malformed,
            "saving sessions with non-string message text"
        );
    }

    match backend.save_sessions(sessions).await {
        Ok(()) => {
            tracing::info!(
                backend = %backend.name(),
                session_count = sessions.len(),
                "sessions saved"
            );
            Ok(())
        }
        Err(error) => {
            tracing::error!(backend = %backend.name(), error = %error, "failed to save sessions");
            Err(ChatError::from_save(&error))
        }
    }
}

pub async fn load_sessions(backend: &dyn SessionBackend) -> ChatResult<Vec<ChatSession>> {
    match backend.fetch_sessions().await {
        Ok(sessions) => {
            tracing::info!(
                backend = %backend.name(),
                session_count = sessions.len(),
                "sessions loaded"
            );
            Ok(sessions)
        }
        Err(error) => {
            tracing::error!(backend = %backend.name(), error = %error, "failed to fetch sessions");
            Err(ChatError::from_load(&error))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::MemoryBackend;
    use gemchat_storage::{Message, MessageId, MessageText, Sender, SessionId, StorageError};

    fn session_with_broken_text() -> ChatSession {
        let mut broken = Message::new(MessageId::new("m1"), Sender::User, "");
        broken.text = MessageText::Malformed(json!({"oops": true}));
        ChatSession::new(SessionId::new("S1")).with_messages(vec![broken])
    }

    #[tokio::test]
    async fn malformed_text_is_flagged_but_still_saved() {
        let backend = MemoryBackend::default();
        let sessions = vec![session_with_broken_text()];

        assert_eq!(malformed_text_count(&sessions), 1);
        save_sessions(&backend, &sessions).await.expect("tolerated");
        assert_eq!(backend.saves(), vec![sessions]);
    }

    #[tokio::test]
    async fn backend_status_is_reported_as_persistence_error() {
        let backend = MemoryBackend::default();
        backend.fail_next_save(StorageError::SaveStatus {
            stage: "save-status",
            status: 502,
            body: "Bad Gateway".to_string(),
        });

        let error = save_sessions(&backend, &[]).await.expect_err("502");
        assert!(matches!(
            error,
            ChatError::Persistence { ref detail, .. } if detail == "Failed to save chat: 502 Bad Gateway"
        ));
    }

    #[tokio::test]
    async fn unauthorized_load_asks_for_login() {
        let backend = MemoryBackend::default();
        backend.fail_next_fetch(StorageError::Unauthorized {
            stage: "fetch-status",
        });

        let error = load_sessions(&backend).await.expect_err("401");
        assert_eq!(error.reason(), "Unauthorized. Please log in.");
    }
}
