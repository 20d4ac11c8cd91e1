//! Append-only conversation for one request.
//!
//! Messages are never edited or removed once appended. A loop step appends
//! all of its messages (assistant turn plus every tool result) in one call,
//! so a failing step leaves no half-written round behind.

use crate::inference::types::{Message, Role};

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation with an optional system prompt and the user message.
    pub fn new(system_prompt: &str, user_message: &str) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.push(Message::user(user_message));
        Self { messages }
    }

    /// Append one message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a complete step in one go.
    pub fn append_step(&mut self, step: Vec<Message>) {
        self.messages.extend(step);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent tool-result message.
    pub fn last_tool_result(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Tool)
    }

    pub fn tool_result_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::Tool).count()
    }

    /// Prefix ending at the last tool result, or the whole conversation when
    /// no tool ran.
    pub fn through_last_tool_result(&self) -> &[Message] {
        match self.messages.iter().rposition(|m| m.role == Role::Tool) {
            Some(idx) => &self.messages[..=idx],
            None => &self.messages,
        }
    }
}
