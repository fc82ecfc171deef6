use std::path::PathBuf;
use std::sync::Arc;

use gemchat_core::ChatController;
use gemchat_llm::{ProviderError, create_chain};
use gemchat_storage::{SessionId, StorageError};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::repl;
use crate::settings::{AppSettings, BackendKind, SettingsError, SettingsStore};

#[derive(Debug, Default, Clone)]
pub struct LaunchOptions {
    pub config_path: Option<PathBuf>,
    pub session_id: Option<String>,
    pub offline: bool,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display(
        "no API key configured on `{stage}`; set GEMCHAT_PROVIDER__API_KEY or GOOGLE_API_KEY, or add provider.api_key to {path:?}"
    ))]
    MissingApiKey { stage: &'static str, path: PathBuf },
    #[snafu(display("failed to save settings on `{stage}`: {source}"))]
    SaveSettings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to create model chain on `{stage}`: {source}"))]
    CreateChain {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("failed to create session backend on `{stage}`: {source}"))]
    CreateBackend {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("invalid session id on `{stage}`: {source}"))]
    InvalidSessionId {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("terminal i/o failed on `{stage}`: {source}"))]
    Terminal {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Wires settings, chain and backend together and runs the terminal loop.
pub async fn run(options: LaunchOptions) -> Result<(), AppError> {
    let store = match options.config_path {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    let mut settings = (*store.settings()).clone();
    if options.offline {
        settings.backend.kind = BackendKind::File;
    }

    let mut input = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    if !settings.provider.is_valid() {
        let captured = capture_api_key(&store, &mut input, &mut stdout).await?;
        settings.provider = captured.provider.clone();
    }

    let provider_config = settings
        .provider
        .to_provider_config()
        .context(MissingApiKeySnafu {
            stage: "resolve-provider-config",
            path: store.config_path().to_path_buf(),
        })?;
    let chain = create_chain(provider_config).context(CreateChainSnafu {
        stage: "create-model-chain",
    })?;
    let backend = settings.backend.build().context(CreateBackendSnafu {
        stage: "create-session-backend",
    })?;
    tracing::info!(
        chain = %chain.id(),
        model_id = %chain.model_id(),
        backend = %backend.name(),
        "starting chat"
    );

    let mut controller = ChatController::new(chain, backend);
    if let Err(error) = controller.load().await {
        tracing::warn!(error = %error, "continuing without stored sessions");
        eprintln!("could not load sessions: {}", error.reason());
    }

    match options.session_id {
        Some(raw) => {
            let session_id = SessionId::parse(&raw).context(InvalidSessionIdSnafu {
                stage: "parse-session-argument",
            })?;
            if let Err(error) = controller.select_session(&session_id) {
                eprintln!("{}; starting a new session", error.reason());
                controller.create_session();
            }
        }
        None => {
            controller.create_session();
        }
    }

    repl::run(&mut controller, input, &mut stdout)
        .await
        .context(TerminalSnafu {
            stage: "run-repl",
        })
}

/// Asks for the model API key when none is configured and writes it to the
/// settings file. A blank answer or closed input leaves the key missing.
pub async fn capture_api_key<R, W>(
    store: &SettingsStore,
    mut input: R,
    output: &mut W,
) -> Result<Arc<AppSettings>, AppError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let missing = MissingApiKeySnafu {
        stage: "capture-api-key",
        path: store.config_path().to_path_buf(),
    };
    let prompt = format!(
        "No API key configured; it will be saved to {}.\nGemini API key: ",
        store.config_path().display()
    );
    output.write_all(prompt.as_bytes()).await.context(TerminalSnafu {
        stage: "prompt-api-key",
    })?;
    output.flush().await.context(TerminalSnafu {
        stage: "prompt-api-key",
    })?;

    let mut line = String::new();
    input.read_line(&mut line).await.context(TerminalSnafu {
        stage: "read-api-key",
    })?;
    if line.trim().is_empty() {
        return missing.fail();
    }

    store.store_api_key(&line).await.context(SaveSettingsSnafu {
        stage: "store-api-key",
    })
}
