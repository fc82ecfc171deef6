use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use gemchat_llm::{BoxFuture, ChainReply, ChainRequest, ModelChain, ProviderError, ProviderResult};
use gemchat_storage::{ChatSession, SessionBackend, StorageError, StorageResult};

#[derive(Debug, Clone)]
pub(crate) enum Script {
    Reply(ChainReply),
    Fail(String),
    Hang,
}

/// Chain double that plays back scripted outcomes and records requests.
///
/// The last script entry repeats once the queue runs dry.
pub(crate) struct ScriptedChain {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChainRequest>>,
}

impl ScriptedChain {
    pub(crate) fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn replying(reply: ChainReply) -> Arc<Self> {
        Self::new(vec![Script::Reply(reply)])
    }

    pub(crate) fn text(text: &str) -> Arc<Self> {
        Self::replying(ChainReply::Text(text.to_string()))
    }

    pub(crate) fn failing(message: &str) -> Arc<Self> {
        Self::new(vec![Script::Fail(message.to_string())])
    }

    pub(crate) fn hanging() -> Arc<Self> {
        Self::new(vec![Script::Hang])
    }

    pub(crate) fn requests(&self) -> Vec<ChainRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn next_script(&self) -> Script {
        let mut scripts = self.scripts.lock().expect("scripts lock");
        if scripts.len() > 1 {
            scripts.pop_front().expect("non-empty script queue")
        } else {
            scripts.front().cloned().unwrap_or(Script::Hang)
        }
    }
}

impl ModelChain for ScriptedChain {
    fn id(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    fn invoke<'a>(&'a self, request: ChainRequest) -> BoxFuture<'a, ProviderResult<ChainReply>> {
        self.requests.lock().expect("requests lock").push(request);
        let script = self.next_script();
        Box::pin(async move {
            match script {
                Script::Reply(reply) => Ok(reply),
                Script::Fail(message) => Err(ProviderError::Upstream {
                    stage: "scripted",
                    message,
                }),
                Script::Hang => std::future::pending().await,
            }
        })
    }
}

/// In-memory session backend recording every bulk write.
#[derive(Default)]
pub(crate) struct MemoryBackend {
    stored: Mutex<Vec<ChatSession>>,
    saves: Mutex<Vec<Vec<ChatSession>>>,
    fetch_failure: Mutex<Option<StorageError>>,
    save_failure: Mutex<Option<StorageError>>,
}

impl MemoryBackend {
    pub(crate) fn with_sessions(sessions: Vec<ChatSession>) -> Self {
        let backend = Self::default();
        *backend.stored.lock().expect("stored lock") = sessions;
        backend
    }

    pub(crate) fn saves(&self) -> Vec<Vec<ChatSession>> {
        self.saves.lock().expect("saves lock").clone()
    }

    pub(crate) fn fail_next_fetch(&self, error: StorageError) {
        *self.fetch_failure.lock().expect("fetch failure lock") = Some(error);
    }

    pub(crate) fn fail_next_save(&self, error: StorageError) {
        *self.save_failure.lock().expect("save failure lock") = Some(error);
    }
}

impl SessionBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_sessions<'a>(&'a self) -> BoxFuture<'a, StorageResult<Vec<ChatSession>>> {
        let outcome = match self.fetch_failure.lock().expect("fetch failure lock").take() {
            Some(error) => Err(error),
            None => Ok(self.stored.lock().expect("stored lock").clone()),
        };
        Box::pin(async move { outcome })
    }

    fn save_sessions<'a>(
        &'a self,
        sessions: &'a [ChatSession],
    ) -> BoxFuture<'a, StorageResult<()>> {
        let outcome = match self.save_failure.lock().expect("save failure lock").take() {
            Some(error) => Err(error),
            None => {
                self.saves.lock().expect("saves lock").push(sessions.to_vec());
                *self.stored.lock().expect("stored lock") = sessions.to_vec();
                Ok(())
            }
        };
        Box::pin(async move { outcome })
    }
}
