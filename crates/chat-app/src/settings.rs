use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use gemchat_llm::{GenerationSettings, ProviderConfig, RIG_GEMINI_PROVIDER_ID};
use gemchat_storage::{
    FileSessionBackend, HttpBackendConfig, HttpSessionBackend, SessionBackend, StorageResult,
    file::DEFAULT_STORE_RELATIVE_PATH, http::DEFAULT_SESSIONS_PATH,
};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
pub const SETTINGS_DIRECTORY_NAME: &str = "gemchat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "GEMCHAT_";
pub const FALLBACK_API_KEY_VAR: &str = "GOOGLE_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Base url override for the model API. Empty keeps the provider default.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub model: GenerationSettings,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: String::new(),
            model: GenerationSettings::default(),
        }
    }
}

impl ProviderSettings {
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if !self.is_valid() {
            return None;
        }

        Some(ProviderConfig::new(
            &self.provider_id,
            &self.api_key,
            &self.endpoint,
            self.model.clone(),
        ))
    }

    pub fn is_valid(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = if self.provider_id.trim().is_empty() {
            default_provider_id()
        } else {
            self.provider_id.trim().to_string()
        };
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = self.endpoint.trim().to_string();
        self.model = self.model.normalized();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Http,
    File,
}

/// Where the session collection lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_sessions_path")]
    pub sessions_path: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: default_base_url(),
            sessions_path: default_sessions_path(),
            bearer_token: None,
            timeout_secs: default_timeout_secs(),
            file_path: None,
        }
    }
}

impl BackendSettings {
    pub fn normalized(mut self) -> Self {
        self.base_url = if self.base_url.trim().is_empty() {
            default_base_url()
        } else {
            self.base_url.trim().to_string()
        };
        self.sessions_path = if self.sessions_path.trim().is_empty() {
            default_sessions_path()
        } else {
            self.sessions_path.trim().to_string()
        };
        self.bearer_token = self
            .bearer_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        self.file_path = self
            .file_path
            .filter(|path| !path.as_os_str().is_empty());
        self
    }

    pub fn store_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_RELATIVE_PATH))
    }

    pub fn build(&self) -> StorageResult<Arc<dyn SessionBackend>> {
        match self.kind {
            BackendKind::Http => {
                let mut config = HttpBackendConfig::new(&self.base_url)
                    .with_sessions_path(&self.sessions_path)
                    .with_timeout(Duration::from_secs(self.timeout_secs));
                if let Some(token) = &self.bearer_token {
                    config = config.with_bearer_token(token);
                }
                Ok(Arc::new(HttpSessionBackend::new(config)?))
            }
            BackendKind::File => Ok(Arc::new(FileSessionBackend::new(self.store_path()))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub backend: BackendSettings,
}

impl AppSettings {
    pub fn normalized(self) -> Self {
        Self {
            provider: self.provider.normalized(),
            backend: self.backend.normalized(),
        }
    }
}

/// Layered settings: defaults, then the JSON file, then `GEMCHAT_*`
/// variables (`__` separates nesting, e.g. `GEMCHAT_PROVIDER__API_KEY`).
pub struct SettingsStore {
    settings: Arc<ArcSwap<AppSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".gemchat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<AppSettings> {
        self.settings.load_full()
    }

    /// Writes `api_key` into the settings file, keeping every other entry in
    /// it, and swaps the in-memory settings.
    pub async fn store_api_key(&self, api_key: &str) -> Result<Arc<AppSettings>, SettingsError> {
        let api_key = api_key.trim();
        let mut document = self.read_document().await?;
        let root = document.as_object_mut().context(NotAnObjectSnafu {
            stage: "edit-settings-document",
            path: self.config_path.clone(),
        })?;
        let provider = root
            .entry("provider")
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        let provider = provider.as_object_mut().context(NotAnObjectSnafu {
            stage: "edit-provider-section",
            path: self.config_path.clone(),
        })?;
        provider.insert("api_key".to_string(), api_key.into());

        let bytes = serde_json::to_vec_pretty(&document).context(EncodeSnafu {
            stage: "encode-settings-document",
        })?;
        write_replacing(&self.config_path, &bytes).await?;

        let mut settings = (*self.settings()).clone();
        settings.provider.api_key = api_key.to_string();
        let settings = Arc::new(settings.normalized());
        self.settings.store(settings.clone());
        tracing::info!(path = %self.config_path.display(), "stored api key in settings");
        Ok(settings)
    }

    pub fn extract(path: &Path) -> Result<AppSettings, figment::Error> {
        let mut settings = Figment::from(Serialized::defaults(AppSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract::<AppSettings>()?
            .normalized();

        if !settings.provider.is_valid()
            && let Ok(api_key) = std::env::var(FALLBACK_API_KEY_VAR)
        {
            settings.provider.api_key = api_key.trim().to_string();
        }
        Ok(settings)
    }

    fn load_from_disk(path: &Path) -> AppSettings {
        if !path.exists() {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
        }

        match Self::extract(path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to parse settings, using defaults"
                );
                AppSettings::default()
            }
        }
    }

    async fn read_document(&self) -> Result<serde_json::Value, SettingsError> {
        match tokio::fs::read(&self.config_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).context(DecodeSnafu {
                stage: "decode-settings-document",
                path: self.config_path.clone(),
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(serde_json::Value::Object(serde_json::Map::new()))
            }
            Err(source) => Err(SettingsError::ReadFile {
                stage: "read-settings-document",
                path: self.config_path.clone(),
                source,
            }),
        }
    }
}

/// Replaces `path` through a sibling temp file so readers never see a
/// partial document.
async fn write_replacing(path: &Path, bytes: &[u8]) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .context(WriteFileSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
    }

    let staged = path.with_extension("json.tmp");
    tokio::fs::write(&staged, bytes).await.context(WriteFileSnafu {
        stage: "write-staged-settings",
        path: staged.clone(),
    })?;
    tokio::fs::rename(&staged, path).await.context(WriteFileSnafu {
        stage: "replace-settings-file",
        path: path.to_path_buf(),
    })
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to read settings at {path:?} on `{stage}`: {source}"))]
    ReadFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("settings at {path:?} are not valid JSON on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("settings at {path:?} must be a JSON object on `{stage}`"))]
    NotAnObject { stage: &'static str, path: PathBuf },
    #[snafu(display("failed to encode settings on `{stage}`: {source}"))]
    Encode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn default_provider_id() -> String {
    RIG_GEMINI_PROVIDER_ID.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_sessions_path() -> String {
    DEFAULT_SESSIONS_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use gemchat_llm::DEFAULT_GEMINI_MODEL;

    use super::*;

    #[test]
    fn defaults_point_at_local_api_and_gemini() {
        let settings = AppSettings::default();

        assert_eq!(settings.provider.provider_id, "gemini");
        assert_eq!(settings.provider.model.model_id, DEFAULT_GEMINI_MODEL);
        assert_eq!(settings.backend.kind, BackendKind::Http);
        assert_eq!(settings.backend.base_url, "http://localhost:3000/api");
        assert_eq!(settings.backend.sessions_path, "chat");
        assert!(settings.provider.to_provider_config().is_none());
    }

    #[test]
    fn normalization_restores_blank_fields() {
        let settings = AppSettings {
            provider: ProviderSettings {
                provider_id: "  ".to_string(),
                api_key: " key ".to_string(),
                endpoint: " ".to_string(),
                model: GenerationSettings {
                    model_id: String::new(),
                    ..GenerationSettings::default()
                },
            },
            backend: BackendSettings {
                base_url: String::new(),
                sessions_path: " ".to_string(),
                bearer_token: Some("  ".to_string()),
                timeout_secs: 0,
                ..BackendSettings::default()
            },
        }
        .normalized();

        assert_eq!(settings.provider.provider_id, "gemini");
        assert_eq!(settings.provider.api_key, "key");
        assert_eq!(settings.provider.endpoint, "");
        assert_eq!(settings.provider.model.model_id, DEFAULT_GEMINI_MODEL);
        assert_eq!(settings.backend.base_url, DEFAULT_BACKEND_URL);
        assert_eq!(settings.backend.sessions_path, "chat");
        assert_eq!(settings.backend.bearer_token, None);
        assert_eq!(settings.backend.timeout_secs, DEFAULT_BACKEND_TIMEOUT_SECS);
    }

    #[test]
    fn file_values_are_overridden_by_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{
                    "provider": { "api_key": "from-file", "model": { "model_id": "gemini-1.5-flash" } },
                    "backend": { "kind": "file", "file_path": "chats.json" }
                }"#,
            )?;
            jail.set_env("GEMCHAT_PROVIDER__API_KEY", "from-env");
            jail.set_env("GEMCHAT_BACKEND__SESSIONS_PATH", "sessions");

            let settings = SettingsStore::extract(Path::new(SETTINGS_FILE_NAME))?;

            assert_eq!(settings.provider.api_key, "from-env");
            assert_eq!(settings.provider.model.model_id, "gemini-1.5-flash");
            assert_eq!(settings.provider.model.top_k, 64);
            assert_eq!(settings.backend.kind, BackendKind::File);
            assert_eq!(settings.backend.store_path(), PathBuf::from("chats.json"));
            assert_eq!(settings.backend.sessions_path, "sessions");
            Ok(())
        });
    }

    #[test]
    fn google_api_key_fills_a_missing_key() {
        Jail::expect_with(|jail| {
            jail.set_env(FALLBACK_API_KEY_VAR, "google-key");

            let settings = SettingsStore::extract(Path::new("missing.json"))?;

            assert_eq!(settings.provider.api_key, "google-key");
            Ok(())
        });
    }

    #[tokio::test]
    async fn stored_api_key_keeps_other_file_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "backend": { "kind": "file" }, "provider": { "endpoint": "http://proxy" } }"#,
        )
        .expect("seed settings");
        let store = SettingsStore::new(path.clone());

        let settings = store.store_api_key("  saved-key \n").await.expect("store key");

        assert_eq!(settings.provider.api_key, "saved-key");
        assert_eq!(store.settings().provider.api_key, "saved-key");
        assert!(!path.with_extension("json.tmp").exists());
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read back")).expect("json");
        assert_eq!(written["provider"]["api_key"], "saved-key");
        assert_eq!(written["provider"]["endpoint"], "http://proxy");
        assert_eq!(written["backend"]["kind"], "file");
    }

    #[tokio::test]
    async fn api_key_creates_missing_settings_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        store.store_api_key("fresh-key").await.expect("store key");

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read back")).expect("json");
        assert_eq!(written, serde_json::json!({ "provider": { "api_key": "fresh-key" } }));
    }

    #[tokio::test]
    async fn non_object_settings_file_is_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "[1, 2]").expect("seed settings");
        let store = SettingsStore::new(path.clone());

        let error = store.store_api_key("key").await.expect_err("not an object");

        assert!(matches!(error, SettingsError::NotAnObject { .. }));
        assert_eq!(std::fs::read_to_string(&path).expect("read back"), "[1, 2]");
    }

    #[test]
    fn file_backend_is_built_from_settings() {
        let settings = BackendSettings {
            kind: BackendKind::File,
            file_path: Some(PathBuf::from("store.json")),
            ..BackendSettings::default()
        };

        let backend = settings.build().expect("file backend");
        assert_eq!(backend.name(), "file");
    }
}
