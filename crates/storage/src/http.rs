use std::time::Duration;

use snafu::{ResultExt, ensure};

use super::error::{
    DecodePayloadSnafu, FetchStatusSnafu, InvalidBaseUrlSnafu, SaveStatusSnafu, StorageResult,
    TransportSnafu, UnauthorizedSnafu,
};
use super::types::{ChatSession, SessionsEnvelope, SessionsPayload};
use super::{BoxFuture, SessionBackend};

pub const DEFAULT_SESSIONS_PATH: &str = "chat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub sessions_path: String,
    pub bearer_token: Option<String>,
    pub timeout: Option<Duration>,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().to_string(),
            sessions_path: DEFAULT_SESSIONS_PATH.to_string(),
            bearer_token: None,
            timeout: None,
        }
    }

    pub fn with_sessions_path(mut self, sessions_path: impl Into<String>) -> Self {
        self.sessions_path = sessions_path.into().trim().to_string();
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into().trim().to_string();
        self.bearer_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn sessions_url(&self) -> StorageResult<String> {
        let base = self.base_url.trim_end_matches('/');
        ensure!(
            base.starts_with("http://") || base.starts_with("https://"),
            InvalidBaseUrlSnafu {
                stage: "build-sessions-url",
                base_url: self.base_url.clone(),
            }
        );

        let path = self.sessions_path.trim_matches('/');
        if path.is_empty() {
            Ok(base.to_string())
        } else {
            Ok(format!("{base}/{path}"))
        }
    }
}

/// Session backend speaking to the web API (`GET`/`POST` on one collection url).
#[derive(Debug, Clone)]
pub struct HttpSessionBackend {
    client: reqwest::Client,
    sessions_url: String,
    bearer_token: Option<String>,
}

impl HttpSessionBackend {
    pub fn new(config: HttpBackendConfig) -> StorageResult<Self> {
        let sessions_url = config.sessions_url()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context(TransportSnafu {
            stage: "build-http-client",
        })?;

        Ok(Self {
            client,
            sessions_url,
            bearer_token: config.bearer_token,
        })
    }

    pub fn sessions_url(&self) -> &str {
        &self.sessions_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch(&self) -> StorageResult<Vec<ChatSession>> {
        let response = self
            .authorize(self.client.get(&self.sessions_url))
            .send()
            .await
            .context(TransportSnafu {
                stage: "send-fetch-request",
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %self.sessions_url, "session backend rejected credentials");
            return UnauthorizedSnafu {
                stage: "fetch-status",
            }
            .fail();
        }

        let body = response.text().await.context(TransportSnafu {
            stage: "read-fetch-response",
        })?;

        if !status.is_success() {
            return FetchStatusSnafu {
                stage: "fetch-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let payload: SessionsPayload = serde_json::from_str(&body).context(DecodePayloadSnafu {
            stage: "decode-fetch-response",
        })?;
        let sessions = payload.into_sessions();
        tracing::debug!(
            url = %self.sessions_url,
            session_count = sessions.len(),
            "fetched sessions"
        );
        Ok(sessions)
    }

    async fn save(&self, sessions: &[ChatSession]) -> StorageResult<()> {
        let response = self
            .authorize(self.client.post(&self.sessions_url))
            .json(&SessionsEnvelope { sessions })
            .send()
            .await
            .context(TransportSnafu {
                stage: "send-save-request",
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return UnauthorizedSnafu {
                stage: "save-status",
            }
            .fail();
        }

        // Fall back to the reason phrase when the server sends no body.
        let body = response.text().await.unwrap_or_default();
        let body = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or_default().to_string()
        } else {
            body
        };

        SaveStatusSnafu {
            stage: "save-status",
            status: status.as_u16(),
            body,
        }
        .fail()
    }
}

impl SessionBackend for HttpSessionBackend {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch_sessions<'a>(&'a self) -> BoxFuture<'a, StorageResult<Vec<ChatSession>>> {
        Box::pin(self.fetch())
    }

    fn save_sessions<'a>(
        &'a self,
        sessions: &'a [ChatSession],
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(self.save(sessions))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;
    use crate::{Message, MessageId, Sender, SessionId, StorageError};

    #[derive(Clone, Default)]
    struct MockBackend {
        fetch_status: u16,
        fetch_body: Value,
        save_status: u16,
        saved: Arc<Mutex<Vec<Value>>>,
    }

    async fn fetch_handler(State(state): State<MockBackend>) -> (StatusCode, String) {
        let status = StatusCode::from_u16(state.fetch_status).unwrap_or(StatusCode::OK);
        (status, state.fetch_body.to_string())
    }

    async fn save_handler(
        State(state): State<MockBackend>,
        axum::Json(body): axum::Json<Value>,
    ) -> StatusCode {
        state.saved.lock().expect("saved lock").push(body);
        StatusCode::from_u16(state.save_status).unwrap_or(StatusCode::OK)
    }

    async fn spawn_backend(state: MockBackend) -> HttpSessionBackend {
        let app = Router::new()
            .route("/api/chat", get(fetch_handler).post(save_handler))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let address = listener.local_addr().expect("mock address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        HttpSessionBackend::new(HttpBackendConfig::new(format!("http://{address}/api")))
            .expect("backend")
    }

    #[tokio::test]
    async fn fetch_reads_wrapped_sessions() {
        let backend = spawn_backend(MockBackend {
            fetch_status: 200,
            fetch_body: json!({"sessions": [
                {"id": "S1", "messages": [{"id": "m1", "sender": "user", "text": "Hi"}]}
            ]}),
            save_status: 200,
            ..MockBackend::default()
        })
        .await;

        let sessions = backend.fetch_sessions().await.expect("fetch");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].messages[0].text.as_plain(), Some("Hi"));
    }

    #[tokio::test]
    async fn fetch_maps_401_to_unauthorized() {
        let backend = spawn_backend(MockBackend {
            fetch_status: 401,
            fetch_body: json!({"error": "no session"}),
            save_status: 200,
            ..MockBackend::default()
        })
        .await;

        let error = backend.fetch_sessions().await.expect_err("401 must fail");
        assert!(error.is_unauthorized());
    }

    #[tokio::test]
    async fn save_posts_the_whole_collection() {
        let state = MockBackend {
            fetch_status: 200,
            fetch_body: json!([]),
            save_status: 201,
            ..MockBackend::default()
        };
        let saved = state.saved.clone();
        let backend = spawn_backend(state).await;

        let sessions = vec![ChatSession::new(SessionId::new("S1")).with_messages(vec![
            Message::new(MessageId::new("m1"), Sender::User, "Hi"),
        ])];
        backend.save_sessions(&sessions).await.expect("save");

        let saved = saved.lock().expect("saved lock");
        assert_eq!(
            saved.as_slice(),
            &[json!({"sessions": [{"id": "S1", "messages": [
                {"id": "m1", "sender": "user", "text": "Hi"}
            ]}]})]
        );
    }

    #[tokio::test]
    async fn save_failure_carries_status() {
        let backend = spawn_backend(MockBackend {
            fetch_status: 200,
            fetch_body: json!([]),
            save_status: 500,
            ..MockBackend::default()
        })
        .await;

        let error = backend.save_sessions(&[]).await.expect_err("500 must fail");
        assert!(matches!(
            error,
            StorageError::SaveStatus { status: 500, ref body, .. } if body == "Internal Server Error"
        ));
    }

    #[test]
    fn rejects_base_url_without_scheme() {
        let error = HttpSessionBackend::new(HttpBackendConfig::new("localhost:3000/api"))
            .expect_err("scheme is required");
        assert!(matches!(error, StorageError::InvalidBaseUrl { .. }));
    }
}
