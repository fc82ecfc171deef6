use std::path::{Path, PathBuf};

use snafu::ResultExt;

use super::error::{
    CreateStoreDirectorySnafu, DecodePayloadSnafu, EncodePayloadSnafu, ReadStoreSnafu,
    RenameStoreSnafu, StorageResult, WriteStoreSnafu,
};
use super::types::{ChatSession, SessionsEnvelope, SessionsPayload};
use super::{BoxFuture, SessionBackend};

pub const DEFAULT_STORE_RELATIVE_PATH: &str = ".gemchat/sessions.json";

/// Offline session backend keeping the collection in one JSON document.
///
/// The document has the same `{ "sessions": [...] }` shape the web API uses.
#[derive(Debug, Clone)]
pub struct FileSessionBackend {
    path: PathBuf,
}

impl Default for FileSessionBackend {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_STORE_RELATIVE_PATH))
    }
}

impl FileSessionBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> StorageResult<Vec<ChatSession>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %display_path(&self.path), "session file not found, starting empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(source).context(ReadStoreSnafu {
                    stage: "read-session-file",
                    path: display_path(&self.path),
                });
            }
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let payload: SessionsPayload =
            serde_json::from_str(&contents).context(DecodePayloadSnafu {
                stage: "decode-session-file",
            })?;
        Ok(payload.into_sessions())
    }

    async fn write(&self, sessions: &[ChatSession]) -> StorageResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context(CreateStoreDirectorySnafu {
                    stage: "create-session-directory",
                    path: display_path(parent),
                })?;
        }

        let content = serde_json::to_string_pretty(&SessionsEnvelope { sessions }).context(
            EncodePayloadSnafu {
                stage: "encode-session-file",
            },
        )?;

        // Write-then-rename so a crash never leaves a half-written collection.
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .context(WriteStoreSnafu {
                stage: "write-temporary-session-file",
                path: display_path(&temp_path),
            })?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .context(RenameStoreSnafu {
                stage: "rename-temporary-session-file",
                from: display_path(&temp_path),
                to: display_path(&self.path),
            })?;

        tracing::debug!(
            path = %display_path(&self.path),
            session_count = sessions.len(),
            "wrote session file"
        );
        Ok(())
    }
}

impl SessionBackend for FileSessionBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch_sessions<'a>(&'a self) -> BoxFuture<'a, StorageResult<Vec<ChatSession>>> {
        Box::pin(self.read())
    }

    fn save_sessions<'a>(
        &'a self,
        sessions: &'a [ChatSession],
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(self.write(sessions))
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, MessageId, Sender, SessionId, StorageError};

    #[tokio::test]
    async fn missing_file_reads_as_empty_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileSessionBackend::new(dir.path().join("absent.json"));

        assert!(backend.fetch_sessions().await.expect("fetch").is_empty());
    }

    #[tokio::test]
    async fn saved_sessions_read_back_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileSessionBackend::new(dir.path().join("nested/sessions.json"));
        let sessions = vec![
            ChatSession::new(SessionId::new("S1")).with_messages(vec![
                Message::new(MessageId::new("m1"), Sender::User, "Hi"),
                Message::new(MessageId::new("m2"), Sender::Ai, "Hello"),
            ]),
            ChatSession::new(SessionId::new("S2")),
        ];

        backend.save_sessions(&sessions).await.expect("save");
        let loaded = backend.fetch_sessions().await.expect("fetch");

        assert_eq!(loaded, sessions);
        assert!(!dir.path().join("nested/sessions.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{not json").expect("seed");

        let error = FileSessionBackend::new(path)
            .fetch_sessions()
            .await
            .expect_err("corrupt payload");
        assert!(matches!(error, StorageError::DecodePayload { .. }));
    }
}
