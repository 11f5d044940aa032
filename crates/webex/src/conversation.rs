use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::commands::Command;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no pending chain accepts this callback")]
pub struct NoSuchChain;

/// A chain left open for one sender by a command with chained callbacks.
#[derive(Debug)]
struct PendingChain {
    commands: Vec<Arc<Command>>,
    carry_over: Option<Value>,
    opened_at: Instant,
}

/// The command a callback resumed and what its opener left behind.
#[derive(Debug)]
pub struct ResumedChain {
    pub command: Arc<Command>,
    pub carry_over: Option<Value>,
}

/// Pending chains keyed by sender. Each sender has at most one, and it only
/// ever resolves for that sender.
pub struct ConversationStore {
    chains: Mutex<HashMap<String, PendingChain>>,
    inactivity_timeout: Duration,
}

impl ConversationStore {
    pub fn new(inactivity_timeout: Duration) -> Self {
        Self { chains: Mutex::new(HashMap::new()), inactivity_timeout }
    }

    /// Replaces any chain already pending for `sender_id`.
    pub fn open(&self, sender_id: &str, commands: Vec<Arc<Command>>, carry_over: Option<Value>) {
        let mut chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        if commands.is_empty() {
            chains.remove(sender_id);
            return;
        }
        debug!(
            event_name = "webex.conversation.opened",
            sender_id = %sender_id,
            pending = commands.len(),
            "conversation chain opened"
        );
        chains.insert(
            sender_id.to_owned(),
            PendingChain { commands, carry_over, opened_at: Instant::now() },
        );
    }

    /// Consumes the sender's chain if it is live and accepts `callback_keyword`.
    /// A non-matching callback leaves the chain in place.
    pub fn resolve(&self, sender_id: &str, callback_keyword: &str) -> Result<ResumedChain, NoSuchChain> {
        let mut chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(chain) = chains.get(sender_id) else {
            return Err(NoSuchChain);
        };

        if chain.opened_at.elapsed() >= self.inactivity_timeout {
            chains.remove(sender_id);
            debug!(event_name = "webex.conversation.expired", sender_id = %sender_id, "chain expired");
            return Err(NoSuchChain);
        }

        let wanted = callback_keyword.trim().to_lowercase();
        let Some(command) =
            chain.commands.iter().find(|command| command.trigger().key() == wanted).cloned()
        else {
            return Err(NoSuchChain);
        };

        let carry_over = chains.remove(sender_id).and_then(|chain| chain.carry_over);
        Ok(ResumedChain { command, carry_over })
    }

    pub fn close(&self, sender_id: &str) {
        self.chains.lock().unwrap_or_else(PoisonError::into_inner).remove(sender_id);
    }

    pub fn pending_callbacks(&self, sender_id: &str) -> Vec<String> {
        let chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        chains
            .get(sender_id)
            .filter(|chain| chain.opened_at.elapsed() < self.inactivity_timeout)
            .map(|chain| {
                chain.commands.iter().map(|command| command.trigger().key().to_owned()).collect()
            })
            .unwrap_or_default()
    }

    /// Drops every chain past the inactivity timeout. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let mut chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        let before = chains.len();
        chains.retain(|_, chain| chain.opened_at.elapsed() < self.inactivity_timeout);
        before - chains.len()
    }

    pub fn len(&self) -> usize {
        self.chains.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
