//! Storage abstraction for persisted collections and identity.
//!
//! The [`Backend`] trait defines the collection operations (save, get,
//! update, delete) and [`Identity`] the parallel auth operations. Both
//! have four interchangeable implementations: the local JSON store,
//! a generic REST API, Firestore, and Supabase. [`open`] selects the
//! implementation once at startup from configuration; unknown or absent
//! values fall back to the local store, as does a managed backend whose
//! construction fails.
//!
//! Failure semantics: read paths degrade (empty list, `None`) and never
//! propagate transport errors; write paths surface a [`StoreError`] and
//! never silently drop data.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::config::{BackendKind, Config};
use crate::kv::Kv;
use crate::models::User;
use crate::store_firestore::{FirestoreIdentity, FirestoreStore};
use crate::store_local::{LocalIdentity, LocalStore};
use crate::store_rest::{RestIdentity, RestStore};
use crate::store_supabase::{SupabaseIdentity, SupabaseStore};

/// Storage key layout. One JSON blob per key.
pub mod keys {
    /// Persisted collections.
    pub const REVIEWS: &str = "reviews";
    pub const SUBMISSIONS: &str = "submissions";
    pub const USERS: &str = "users";

    /// Current signed-in user marker (local identity).
    pub const SESSION: &str = "session";
    /// Bearer token persisted by the REST identity.
    pub const AUTH_TOKEN: &str = "auth_token";
    /// Server-side token table (HTTP server).
    pub const SESSIONS: &str = "sessions";

    /// One key per browse filter dimension.
    pub const BROWSE_SEARCH: &str = "browse.search";
    pub const BROWSE_CATEGORY: &str = "browse.category";
    pub const BROWSE_PRICING: &str = "browse.pricing";
    pub const BROWSE_POPULARITY: &str = "browse.popularity";
    pub const BROWSE_SORT: &str = "browse.sort";

    pub const FAVORITES: &str = "favorites";
    pub const COMPARE: &str = "compare";
    pub const DARK_MODE: &str = "dark_mode";

    pub const ANALYTICS_EVENTS: &str = "analytics_events";
    pub const ERROR_LOG: &str = "error_log";
    pub const CHAT_TRANSCRIPT: &str = "chat_transcript";
}

/// Errors surfaced by [`Backend`] write paths.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `update` or a lookup addressed a record that does not exist.
    #[error("no record '{id}' in collection '{collection}'")]
    NotFound { collection: String, id: String },
    /// The underlying medium is unreachable, unwritable, or misconfigured.
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },
    /// A stored or received payload could not be (de)serialized.
    #[error("malformed record: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// Errors surfaced by [`Identity`] operations. These are expected
/// outcomes, not faults: callers present `{0}` directly.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email already exists")]
    EmailTaken,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is blocked")]
    Blocked,
    #[error("{0}")]
    Validation(String),
    #[error("auth unavailable: {0}")]
    Unavailable(String),
}

/// Receipt for a successful [`Backend::save`].
#[derive(Debug, Clone)]
pub struct SaveReceipt {
    pub id: String,
}

/// Exact-match filters for [`Backend::get`]. All provided keys must
/// match (conjunction).
#[derive(Debug, Clone, Default)]
pub struct RecordFilters {
    pub tool_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
}

impl RecordFilters {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn by_tool(tool_id: impl Into<String>) -> Self {
        Self {
            tool_id: Some(tool_id.into()),
            ..Self::default()
        }
    }

    pub fn by_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn by_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tool_id.is_none() && self.user_id.is_none() && self.status.is_none()
    }

    /// Filter keys and values as wire pairs, for adapters that express
    /// filters in a query string.
    pub fn as_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(v) = &self.tool_id {
            pairs.push(("tool_id", v.as_str()));
        }
        if let Some(v) = &self.user_id {
            pairs.push(("user_id", v.as_str()));
        }
        if let Some(v) = &self.status {
            pairs.push(("status", v.as_str()));
        }
        pairs
    }

    /// In-process evaluation, used by the local adapter.
    pub fn matches(&self, record: &Value) -> bool {
        self.as_pairs()
            .iter()
            .all(|(key, want)| record.get(*key).and_then(Value::as_str) == Some(*want))
    }
}

/// A persistence backend over named collections of JSON records.
///
/// The backend owns record lifecycle: it assigns `id` and `created_at`
/// on save and stamps `updated_at` on update.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Assign an id (if absent) and `created_at`, then insert the record.
    async fn save(&self, collection: &str, value: Value) -> Result<SaveReceipt, StoreError>;

    /// Records matching all filters, sorted by `created_at` descending.
    ///
    /// Never fails: an absent collection or an unreachable medium
    /// degrades to an empty list.
    async fn get(&self, collection: &str, filters: &RecordFilters) -> Vec<Value>;

    /// Shallow-merge `patch` into the record and stamp `updated_at`.
    ///
    /// Fails with [`StoreError::NotFound`] when the id is absent. A
    /// failed update leaves the stored record untouched.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError>;

    /// Remove the record. Idempotent: an absent id is a success.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

/// Identity operations, selected by the same policy as [`Backend`].
#[async_trait]
pub trait Identity: Send + Sync {
    /// Register a new account. Email uniqueness is enforced.
    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError>;

    /// Authenticate and mark the session. Unknown emails and bad
    /// passwords fail identically.
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Clear the session marker. Succeeds when already signed out.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// The signed-in user, or `None` (including on any internal failure).
    async fn current_user(&self) -> Option<User>;
}

/// The selected backend, identity, and the always-local kv namespace.
///
/// Built once at startup by [`open`]; callers share the `Arc`s for the
/// life of the process instead of re-running selection per call.
#[derive(Clone)]
pub struct Stack {
    pub backend: Arc<dyn Backend>,
    pub identity: Arc<dyn Identity>,
    /// Client-local state (preferences, favorites, analytics) stays in
    /// this namespace regardless of the selected backend.
    pub kv: Kv,
}

/// Select and construct the configured backend and identity.
///
/// A managed backend whose construction fails (missing credentials,
/// unusable configuration) logs a warning and is replaced by the local
/// store for the remainder of the session. This is a one-time fallback
/// at construction, not a per-call retry.
pub fn open(config: &Config) -> Result<Stack> {
    let kv = Kv::open(&config.storage.path).with_context(|| {
        format!(
            "failed to open local store at {}",
            config.storage.path.display()
        )
    })?;
    let local = LocalStore::new(kv.clone());

    let stack = match config.storage.kind() {
        BackendKind::Local => local_stack(local, kv),
        BackendKind::Rest => {
            let store = RestStore::new(&config.rest, kv.clone());
            let identity = RestIdentity::new(&config.rest, kv.clone());
            Stack {
                backend: Arc::new(store),
                identity: Arc::new(identity),
                kv,
            }
        }
        BackendKind::Firestore => match FirestoreStore::new(&config.firestore) {
            Ok(store) => {
                let identity = FirestoreIdentity::new(&config.firestore, kv.clone());
                Stack {
                    backend: Arc::new(store),
                    identity: Arc::new(identity),
                    kv,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "firestore backend unavailable, using local store");
                local_stack(local, kv)
            }
        },
        BackendKind::Supabase => match SupabaseStore::new(&config.supabase) {
            Ok(store) => {
                let identity = SupabaseIdentity::new(&config.supabase, kv.clone());
                Stack {
                    backend: Arc::new(store),
                    identity: Arc::new(identity),
                    kv,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "supabase backend unavailable, using local store");
                local_stack(local, kv)
            }
        },
    };

    Ok(stack)
}

fn local_stack(local: LocalStore, kv: Kv) -> Stack {
    let identity = LocalIdentity::new(local.clone());
    Stack {
        backend: Arc::new(local),
        identity: Arc::new(identity),
        kv,
    }
}

/// Current time as an ISO-8601 string. Lexicographic order on these
/// strings is chronological order.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Sort records by `created_at` descending, id ascending as tiebreak.
pub fn sort_newest_first(records: &mut [Value]) {
    records.sort_by(|a, b| {
        let a_created = a.get("created_at").and_then(Value::as_str).unwrap_or("");
        let b_created = b.get("created_at").and_then(Value::as_str).unwrap_or("");
        b_created.cmp(a_created).then_with(|| {
            let a_id = a.get("id").and_then(Value::as_str).unwrap_or("");
            let b_id = b.get("id").and_then(Value::as_str).unwrap_or("");
            a_id.cmp(b_id)
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filters_are_conjunctive() {
        let record = json!({"tool_id": "7", "status": "pending"});
        let both = RecordFilters {
            tool_id: Some("7".into()),
            status: Some("pending".into()),
            ..Default::default()
        };
        assert!(both.matches(&record));

        let wrong_status = RecordFilters {
            tool_id: Some("7".into()),
            status: Some("approved".into()),
            ..Default::default()
        };
        assert!(!wrong_status.matches(&record));
        assert!(RecordFilters::none().matches(&record));
    }

    #[test]
    fn sort_is_newest_first_with_stable_tiebreak() {
        let mut records = vec![
            json!({"id": "b", "created_at": "2024-01-01T00:00:00.000Z"}),
            json!({"id": "c", "created_at": "2024-02-01T00:00:00.000Z"}),
            json!({"id": "a", "created_at": "2024-01-01T00:00:00.000Z"}),
        ];
        sort_newest_first(&mut records);
        let ids: Vec<&str> = records
            .iter()
            .map(|r| r.get("id").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }
}
