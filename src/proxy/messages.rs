//! Conversation assembly.

use super::types::HistoryEntry;
use crate::upstream::{ChatTurn, Role};

/// Instruction placed at the head of every conversation.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Build the ordered turn list sent upstream.
///
/// System turn first, then each history entry's user and assistant turns
/// (whichever are present, in that order), then `prompt` as the final user
/// turn. Content is passed through untouched, empty strings included.
pub fn assemble_messages(prompt: &str, history: &[HistoryEntry]) -> Vec<ChatTurn> {
    let mut messages = Vec::with_capacity(2 + history.len() * 2);
    messages.push(ChatTurn::new(Role::System, SYSTEM_PROMPT));

    for entry in history {
        if let Some(user) = &entry.user {
            messages.push(ChatTurn::new(Role::User, user.as_str()));
        }
        if let Some(assistant) = &entry.assistant {
            messages.push(ChatTurn::new(Role::Assistant, assistant.as_str()));
        }
    }

    messages.push(ChatTurn::new(Role::User, prompt));
    messages
}
