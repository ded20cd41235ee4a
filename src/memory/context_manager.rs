//! History window management
//!
//! Bounds a session's history with a sliding window over whole exchanges.
//! An exchange starts at a user prompt and runs to the next one; eviction
//! never leaves a tool call or tool return without its user prompt, and never
//! touches the newest exchange.

use crate::memory::store::ConversationState;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    max_messages: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self { max_messages: 200 }
    }
}

impl HistoryPolicy {
    pub fn new(max_messages: usize) -> Self {
        Self { max_messages }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn should_evict(&self, state: &ConversationState) -> bool {
        state.len() > self.max_messages
    }

    /// Drop the oldest exchanges until the cap holds. Returns how many
    /// messages were removed.
    pub fn enforce(&self, state: &mut ConversationState) -> usize {
        if !self.should_evict(state) {
            return 0;
        }

        let protected_from = state.last_exchange_start().unwrap_or(0);
        let mut evicted = 0;

        while state.len() > self.max_messages && evicted < protected_from {
            state.remove_oldest();
            evicted += 1;
        }

        // Finish the partially evicted exchange.
        while evicted < protected_from
            && state.front().is_some_and(|m| !m.is_user_prompt())
        {
            state.remove_oldest();
            evicted += 1;
        }

        if evicted > 0 {
            info!(
                evicted,
                remaining = state.len(),
                cap = self.max_messages,
                "Evicted oldest history"
            );
        }

        evicted
    }
}
