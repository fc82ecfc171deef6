use gemchat_llm::{HistoryMessage, Role};
use gemchat_storage::{Message, MessageId, Sender};

pub fn role_for(sender: Sender) -> Role {
    match sender {
        Sender::User => Role::User,
        Sender::Ai => Role::Assistant,
    }
}

/// Converts stored messages into role-tagged chain history.
///
/// `edited` names the message being re-submitted; it is left out so the new
/// text goes to the model as the input rather than twice.
pub fn format_history(messages: &[Message], edited: Option<&MessageId>) -> Vec<HistoryMessage> {
    messages
        .iter()
        .filter(|message| edited != Some(&message.id))
        .map(|message| {
            HistoryMessage::new(role_for(message.sender), message.text.to_plain_string())
        })
        .collect()
}
