use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro-latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

impl SafetySetting {
    pub const fn new(category: HarmCategory, threshold: HarmBlockThreshold) -> Self {
        Self {
            category,
            threshold,
        }
    }
}

pub fn default_safety_settings() -> Vec<SafetySetting> {
    vec![
        SafetySetting::new(
            HarmCategory::HarmCategoryHarassment,
            HarmBlockThreshold::BlockLowAndAbove,
        ),
        SafetySetting::new(
            HarmCategory::HarmCategoryHateSpeech,
            HarmBlockThreshold::BlockMediumAndAbove,
        ),
    ]
}

/// Sampling and safety knobs sent with every completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_safety_settings")]
    pub safety_settings: Vec<SafetySetting>,
    #[serde(default)]
    pub preamble: Option<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            safety_settings: default_safety_settings(),
            preamble: None,
        }
    }
}

impl GenerationSettings {
    pub fn normalized(mut self) -> Self {
        self.model_id = self.model_id.trim().to_string();
        if self.model_id.is_empty() {
            self.model_id = default_model_id();
        }
        self.preamble = self
            .preamble
            .map(|preamble| preamble.trim().to_string())
            .filter(|preamble| !preamble.is_empty());
        self
    }

    /// Provider-specific request fields that have no slot on the generic
    /// completion builder.
    pub fn additional_params(&self) -> Value {
        json!({
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
                "topK": self.top_k,
                "topP": self.top_p,
            },
            "safetySettings": self.safety_settings,
        })
    }
}

fn default_model_id() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_temperature() -> f64 {
    1.0
}

fn default_max_output_tokens() -> u64 {
    8192
}

fn default_top_k() -> u32 {
    64
}

fn default_top_p() -> f64 {
    0.95
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additional_params_use_gemini_wire_names() {
        let params = GenerationSettings::default().additional_params();

        assert_eq!(params["generationConfig"]["topK"], json!(64));
        assert_eq!(params["generationConfig"]["maxOutputTokens"], json!(8192));
        assert_eq!(
            params["safetySettings"][0],
            json!({"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_LOW_AND_ABOVE"})
        );
    }

    #[test]
    fn blank_model_falls_back_to_default() {
        let settings = GenerationSettings {
            model_id: "  ".to_string(),
            preamble: Some("   ".to_string()),
            ..GenerationSettings::default()
        }
        .normalized();

        assert_eq!(settings.model_id, DEFAULT_GEMINI_MODEL);
        assert_eq!(settings.preamble, None);
    }
}
