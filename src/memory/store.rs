//! Conversation history storage
//!
//! Append-only ordered messages with an approximate token count.

use crate::models::Message;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    /// VecDeque so eviction from the front is cheap
    messages: VecDeque<Message>,
    /// Total token count (approximate)
    total_tokens: usize,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.total_tokens += message.token_estimate();
        self.messages.push_back(message);
    }

    // =============================
    // Iterators (ZERO ALLOCATION)
    // =============================

    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.messages.iter()
    }

    /// Messages appended at or after position `start`.
    pub fn messages_since(&self, start: usize) -> impl Iterator<Item = &Message> {
        self.messages.iter().skip(start)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn front(&self) -> Option<&Message> {
        self.messages.front()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Position of the most recent user prompt.
    pub fn last_exchange_start(&self) -> Option<usize> {
        self.messages.iter().rposition(Message::is_user_prompt)
    }

    pub fn remove_oldest(&mut self) -> Option<Message> {
        let msg = self.messages.pop_front();

        if let Some(ref m) = msg {
            self.total_tokens = self.total_tokens.saturating_sub(m.token_estimate());
        }

        msg
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.total_tokens = 0;
    }
}
