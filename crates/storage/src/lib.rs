use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod file;
pub mod http;
pub mod ids;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use file::FileSessionBackend;
pub use http::{HttpBackendConfig, HttpSessionBackend};
pub use ids::{MessageId, SessionId};
pub use types::{ChatSession, Message, MessageText, Sender};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Bulk read/bulk write access to the persisted session collection.
///
/// The whole collection travels in one request each way; there is no
/// per-session or per-message endpoint.
pub trait SessionBackend: Send + Sync {
    fn name(&self) -> &str;
    fn fetch_sessions<'a>(&'a self) -> BoxFuture<'a, StorageResult<Vec<ChatSession>>>;
    fn save_sessions<'a>(&'a self, sessions: &'a [ChatSession])
    -> BoxFuture<'a, StorageResult<()>>;
}
