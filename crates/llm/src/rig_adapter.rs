use rig::completion::{AssistantContent, CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::gemini;
use snafu::{ResultExt, ensure};

use super::provider::{
    BoxFuture, ChainReply, ChainRequest, CompletionsFailedSnafu, HistoryMessage,
    HttpClientSnafu, MissingApiKeySnafu, ModelChain, ProviderConfig, ProviderResult, Role,
};

pub const RIG_GEMINI_PROVIDER_ID: &str = "gemini";

/// Gemini chat chain: prompt template, model call and text extraction.
pub struct RigGeminiChain {
    config: ProviderConfig,
}

/// Provider-neutral view of one assistant content block.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplyPart {
    Text(String),
    Other(&'static str),
}

impl RigGeminiChain {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-gemini-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<gemini::Client> {
        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    fn to_rig_message(message: &HistoryMessage) -> RigMessage {
        match message.role {
            Role::User => RigMessage::user(message.content.clone()),
            Role::Assistant => RigMessage::assistant(message.content.clone()),
        }
    }

    fn to_reply_part(content: &AssistantContent) -> ReplyPart {
        match content {
            AssistantContent::Text(text) => ReplyPart::Text(text.text.clone()),
            AssistantContent::ToolCall(_) => ReplyPart::Other("tool_call"),
            AssistantContent::Reasoning(_) => ReplyPart::Other("reasoning"),
            #[allow(unreachable_patterns)]
            _ => ReplyPart::Other("unknown"),
        }
    }

    fn reply_from_parts(parts: Vec<ReplyPart>) -> ChainReply {
        let mut text = String::new();
        let mut saw_text = false;
        let mut other_kind = None;

        for part in parts {
            match part {
                ReplyPart::Text(fragment) => {
                    saw_text = true;
                    text.push_str(&fragment);
                }
                ReplyPart::Other(kind) => {
                    other_kind.get_or_insert(kind);
                }
            }
        }

        match (saw_text, other_kind) {
            (true, _) => ChainReply::Text(text),
            (false, Some(kind)) => ChainReply::NonText {
                kind: kind.to_string(),
            },
            (false, None) => ChainReply::Empty,
        }
    }

    async fn complete(&self, request: ChainRequest) -> ProviderResult<ChainReply> {
        let client = Self::build_client(&self.config)?;
        let generation = &self.config.generation;
        let model = client.completion_model(generation.model_id.clone());

        let history = request
            .history
            .iter()
            .map(Self::to_rig_message)
            .collect::<Vec<_>>();

        tracing::debug!(
            provider_id = %self.config.provider_id,
            model_id = %generation.model_id,
            history_len = history.len(),
            "invoking gemini chain"
        );

        let mut builder = model
            .completion_request(RigMessage::user(request.input))
            .messages(history)
            .temperature(generation.temperature)
            .max_tokens(generation.max_output_tokens)
            .additional_params(generation.additional_params());

        if let Some(preamble) = &generation.preamble {
            builder = builder.preamble(preamble.clone());
        }

        let response = builder.send().await.context(CompletionsFailedSnafu {
            stage: "send-completion",
        })?;

        let parts = response
            .choice
            .iter()
            .map(Self::to_reply_part)
            .collect::<Vec<_>>();
        Ok(Self::reply_from_parts(parts))
    }
}

impl ModelChain for RigGeminiChain {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn model_id(&self) -> &str {
        &self.config.generation.model_id
    }

    fn invoke<'a>(&'a self, request: ChainRequest) -> BoxFuture<'a, ProviderResult<ChainReply>> {
        Box::pin(self.complete(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenerationSettings, ProviderError};

    #[test]
    fn text_fragments_are_joined_verbatim() {
        let reply = RigGeminiChain::reply_from_parts(vec![
            ReplyPart::Text("Hello".to_string()),
            ReplyPart::Text(" there\n".to_string()),
        ]);
        assert_eq!(reply, ChainReply::Text("Hello there\n".to_string()));
    }

    #[test]
    fn reply_without_text_is_not_a_string() {
        let reply = RigGeminiChain::reply_from_parts(vec![ReplyPart::Other("tool_call")]);
        assert_eq!(
            reply,
            ChainReply::NonText {
                kind: "tool_call".to_string()
            }
        );
        assert_eq!(RigGeminiChain::reply_from_parts(Vec::new()), ChainReply::Empty);
    }

    #[test]
    fn missing_api_key_is_rejected_up_front() {
        let config = ProviderConfig::new("gemini", "  ", "", GenerationSettings::default());
        let error = RigGeminiChain::new(config).err();
        assert!(matches!(error, Some(ProviderError::MissingApiKey { .. })));
    }
}
