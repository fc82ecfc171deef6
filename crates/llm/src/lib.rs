use std::sync::Arc;

mod model;
mod provider;
mod rig_adapter;

pub use model::{
    DEFAULT_GEMINI_MODEL, GenerationSettings, HarmBlockThreshold, HarmCategory, SafetySetting,
    default_safety_settings,
};
pub use provider::{
    BoxFuture, ChainReply, ChainRequest, HistoryMessage, ModelChain, ProviderConfig,
    ProviderError, ProviderResult, Role,
};
pub use rig_adapter::{RIG_GEMINI_PROVIDER_ID, RigGeminiChain};

pub fn create_chain(mut config: ProviderConfig) -> ProviderResult<Arc<dyn ModelChain>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
    }
    config.generation = config.generation.normalized();

    match config.provider_id.as_str() {
        "gemini" | "google" | "rig-gemini" => {
            config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigGeminiChain::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-chain",
            provider_id: config.provider_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_unsupported() {
        let config = ProviderConfig::new("llama", "key", "", GenerationSettings::default());
        assert!(matches!(
            create_chain(config),
            Err(ProviderError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn google_alias_resolves_to_gemini() {
        let config = ProviderConfig::new("google", "key", "", GenerationSettings::default());
        let chain = create_chain(config).expect("gemini chain");
        assert_eq!(chain.id(), RIG_GEMINI_PROVIDER_ID);
        assert_eq!(chain.model_id(), DEFAULT_GEMINI_MODEL);
    }
}
