//! Local analytics sinks: the search-event ring buffer, the error log,
//! and chat transcript persistence.
//!
//! Everything here is fire-and-forget from the caller's point of view.
//! Failures are logged and swallowed; recording an event must never fail
//! a user-facing operation. Both ring buffers are capped and evict the
//! oldest entry first.

use serde::{Deserialize, Serialize};

use crate::kv::Kv;
use crate::query::BrowseState;
use crate::store::{keys, now_iso};

/// Ring buffers keep at most this many entries.
pub const RING_CAP: usize = 100;

/// A "search performed" notification, emitted after the debounce window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchEvent {
    pub term: String,
    pub results: usize,
    pub category: String,
    pub pricing: String,
    pub popularity: String,
    pub sort: String,
    pub at: String,
}

impl SearchEvent {
    pub fn from_state(state: &BrowseState, results: usize) -> Self {
        Self {
            term: state.search.clone(),
            results,
            category: state.category.clone(),
            pricing: state.pricing.as_str().to_string(),
            popularity: state.popularity.as_str().to_string(),
            sort: state.sort.as_str().to_string(),
            at: now_iso(),
        }
    }
}

/// A captured error, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub context: String,
    pub message: String,
    pub at: String,
}

/// One line of the chatbot transcript. The chatbot itself lives
/// elsewhere; only its transcript persistence is handled here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub text: String,
    pub at: String,
}

#[derive(Clone)]
pub struct Analytics {
    kv: Kv,
}

impl Analytics {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    pub fn record_search(&self, event: SearchEvent) {
        self.push_ring(keys::ANALYTICS_EVENTS, event);
    }

    pub fn recent_searches(&self) -> Vec<SearchEvent> {
        self.kv.read_json(keys::ANALYTICS_EVENTS).unwrap_or_default()
    }

    pub fn record_error(&self, context: &str, message: &str) {
        self.push_ring(
            keys::ERROR_LOG,
            ErrorEntry {
                context: context.to_string(),
                message: message.to_string(),
                at: now_iso(),
            },
        );
    }

    pub fn errors(&self) -> Vec<ErrorEntry> {
        self.kv.read_json(keys::ERROR_LOG).unwrap_or_default()
    }

    fn push_ring<T: Serialize + serde::de::DeserializeOwned>(&self, key: &str, entry: T) {
        let mut entries: Vec<T> = self.kv.read_json(key).unwrap_or_default();
        entries.push(entry);
        if entries.len() > RING_CAP {
            let overflow = entries.len() - RING_CAP;
            entries.drain(..overflow);
        }
        if let Err(e) = self.kv.write_json(key, &entries) {
            tracing::warn!(key, error = %e, "failed to persist analytics entry");
        }
    }

    // ============ Chat transcript ============

    pub fn append_chat(&self, role: &str, text: &str) {
        let mut transcript: Vec<ChatMessage> =
            self.kv.read_json(keys::CHAT_TRANSCRIPT).unwrap_or_default();
        transcript.push(ChatMessage {
            role: role.to_string(),
            text: text.to_string(),
            at: now_iso(),
        });
        if let Err(e) = self.kv.write_json(keys::CHAT_TRANSCRIPT, &transcript) {
            tracing::warn!(error = %e, "failed to persist chat transcript");
        }
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.kv.read_json(keys::CHAT_TRANSCRIPT).unwrap_or_default()
    }

    pub fn clear_transcript(&self) {
        if let Err(e) = self.kv.remove(keys::CHAT_TRANSCRIPT) {
            tracing::warn!(error = %e, "failed to clear chat transcript");
        }
    }
}
