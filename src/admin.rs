//! Back-office operations over the users collection.
//!
//! Moderation of reviews and submissions lives in their service modules;
//! this module covers user administration and the admin gate itself.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::models::{Role, User, UserStatus};
use crate::store::{keys, Backend, Identity, RecordFilters};

/// The signed-in admin, or an error explaining why the caller is not one.
pub async fn require_admin(identity: &dyn Identity) -> Result<User> {
    let user = match identity.current_user().await {
        Some(user) => user,
        None => bail!("not signed in"),
    };
    if user.is_blocked() {
        bail!("account is blocked");
    }
    if !user.is_admin() {
        bail!("admin role required");
    }
    Ok(user)
}

/// All users, newest first, with password digests stripped.
pub async fn list_users(backend: &dyn Backend, blocked_only: bool) -> Vec<User> {
    let records = backend.get(keys::USERS, &RecordFilters::none()).await;
    records
        .into_iter()
        .filter_map(|value: Value| match serde_json::from_value::<User>(value) {
            Ok(user) => Some(user.sanitized()),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed user record");
                None
            }
        })
        .filter(|user| !blocked_only || user.is_blocked())
        .collect()
}

pub async fn set_user_status(backend: &dyn Backend, id: &str, status: UserStatus) -> Result<()> {
    backend
        .update(keys::USERS, id, json!({"status": status.as_str()}))
        .await
        .context("failed to update user status")?;
    Ok(())
}

pub async fn set_user_role(backend: &dyn Backend, id: &str, role: Role) -> Result<()> {
    backend
        .update(keys::USERS, id, json!({"role": role.as_str()}))
        .await
        .context("failed to update user role")?;
    Ok(())
}

pub async fn block(backend: &dyn Backend, id: &str) -> Result<()> {
    set_user_status(backend, id, UserStatus::Blocked).await
}

pub async fn unblock(backend: &dyn Backend, id: &str) -> Result<()> {
    set_user_status(backend, id, UserStatus::Active).await
}
