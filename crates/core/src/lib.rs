mod controller;
mod edit;
mod error;
mod history;
mod persistence;
mod roundtrip;
mod store;

#[cfg(test)]
mod test_support;

pub use controller::ChatController;
pub use edit::{EditContext, EditFlow, EditState, PendingRegeneration};
pub use error::{ChatError, ChatResult, FALLBACK_INVOCATION_REASON, UNAUTHORIZED_REASON};
pub use history::{format_history, role_for};
pub use persistence::{load_sessions, malformed_text_count, save_sessions};
pub use roundtrip::{RoundTrip, SubmitOptions};
pub use store::{RequestStatus, SessionStore};
