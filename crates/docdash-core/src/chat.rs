//! Linear conversation history for the question-answering flow.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const GREETING: &str = "Hello! I'm your Document AI Assistant. Ask me anything about your processed documents and I'll search through them to provide you with relevant answers.";

/// Assistant turn recorded when answering failed, so the question is not left pending.
pub const ANSWER_FAILED: &str = "I apologize, but I encountered an error while processing your question. Please try again.";

pub const DEFAULT_CHAT_MEMORY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Bounded history; the oldest messages fall off once `max_messages` is hit.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    messages: VecDeque<ChatMessage>,
    max_messages: usize,
}

impl ChatHistory {
    /// A fresh history holding only the assistant greeting.
    pub fn new(max_messages: usize) -> Self {
        let mut history = Self {
            messages: VecDeque::new(),
            max_messages: max_messages.max(1),
        };
        history.reset();
        history
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push_back(ChatMessage {
            role: Role::Assistant,
            content: GREETING.to_string(),
        });
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into());
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into());
    }

    fn push(&mut self, role: Role, content: String) {
        self.messages.push_back(ChatMessage { role, content });
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    /// The last message, if it is an unanswered user turn.
    pub fn pending_question(&self) -> Option<&str> {
        self.messages
            .back()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CHAT_MEMORY)
    }
}
