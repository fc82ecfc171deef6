use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;

use super::model::GenerationSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    /// Optional base url override; empty means the provider default.
    pub endpoint: String,
    pub generation: GenerationSettings,
}

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        generation: GenerationSettings,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
            generation,
        }
    }
}

/// Who authored one history entry, from the model's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One chain invocation: prior turns plus the new human input.
///
/// The chain renders this as `[history..., human(input)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRequest {
    pub input: String,
    pub history: Vec<HistoryMessage>,
}

impl ChainRequest {
    pub fn new(input: impl Into<String>, history: Vec<HistoryMessage>) -> Self {
        Self {
            input: input.into(),
            history,
        }
    }
}

/// What came back from a chain call that did not fail outright.
///
/// Only `Text` is a usable reply. A filtered answer arrives as `Empty`;
/// `NonText` covers tool calls and other non-prose content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainReply {
    Text(String),
    Empty,
    NonText { kind: String },
}

impl ChainReply {
    pub fn kind(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Empty => "empty",
            Self::NonText { kind } => kind,
        }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("{message}"))]
    Upstream {
        stage: &'static str,
        message: String,
    },
}

/// The external prompt -> model -> parsed-output pipeline.
pub trait ModelChain: Send + Sync {
    fn id(&self) -> &str;
    fn model_id(&self) -> &str;
    fn invoke<'a>(&'a self, request: ChainRequest) -> BoxFuture<'a, ProviderResult<ChainReply>>;
}
