//! Generic REST backend: one resource path per collection.
//!
//! Wire shape: `POST /{collection}` to create, `GET /{collection}?{filters}`
//! to list, `PUT /{collection}/{id}` to patch, `DELETE /{collection}/{id}`
//! to remove, with two path specializations (`/reviews/{id}/helpful`,
//! `/submissions/{id}/status`). Identity: `POST /auth/register`,
//! `POST /auth/login`, `GET /auth/me`.
//!
//! The API is not assumed to be tidy: list responses may arrive as a bare
//! array, as `{"data": [...]}`, or as a single object, and a
//! backend-issued `_id` field is aliased to `id` before records reach the
//! rest of the crate. A bearer token stored under [`keys::AUTH_TOKEN`] is
//! attached to every request when present.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::RestConfig;
use crate::kv::Kv;
use crate::models::User;
use crate::store::{
    keys, sort_newest_first, AuthError, Backend, Identity, RecordFilters, SaveReceipt, StoreError,
};

pub struct RestStore {
    base_url: String,
    client: reqwest::Client,
    kv: Kv,
}

impl RestStore {
    pub fn new(config: &RestConfig, kv: Kv) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: client(config.timeout_secs),
            kv,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.kv.read_json::<String>(keys::AUTH_TOKEN) {
            Some(token) => req.header("Authorization", format!("Bearer {token}")),
            None => req,
        }
    }
}

fn client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Alias a backend-issued `_id` to `id`.
fn normalize_record(mut record: Value) -> Value {
    if let Some(obj) = record.as_object_mut() {
        if !obj.contains_key("id") {
            if let Some(raw_id) = obj.get("_id").cloned() {
                let id = match raw_id {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                obj.insert("id".to_string(), json!(id));
            }
        }
    }
    record
}

/// Accept a bare array, a `{"data": [...]}` envelope, or a single object.
fn normalize_envelope(body: Value) -> Vec<Value> {
    let records = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            Some(single @ Value::Object(_)) => vec![single],
            _ => vec![Value::Object(obj)],
        },
        _ => Vec::new(),
    };
    records.into_iter().map(normalize_record).collect()
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::unavailable(e.to_string())
}

async fn reject(collection: &str, id: Option<&str>, resp: reqwest::Response) -> StoreError {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = id {
            return StoreError::not_found(collection, id);
        }
    }
    let body = resp.text().await.unwrap_or_default();
    StoreError::unavailable(format!("API error {status}: {body}"))
}

#[async_trait]
impl Backend for RestStore {
    async fn save(&self, collection: &str, value: Value) -> Result<SaveReceipt, StoreError> {
        let resp = self
            .authorized(self.client.post(self.url(collection)).json(&value))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(reject(collection, None, resp).await);
        }

        let body: Value = resp.json().await.map_err(transport)?;
        let created = normalize_record(body);
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::unavailable("create response carried no id"))?;
        Ok(SaveReceipt { id })
    }

    async fn get(&self, collection: &str, filters: &RecordFilters) -> Vec<Value> {
        let req = self
            .client
            .get(self.url(collection))
            .query(&filters.as_pairs());
        let resp = match self.authorized(req).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(collection, status = %resp.status(), "list request rejected");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(collection, error = %e, "list request failed");
                return Vec::new();
            }
        };

        let body: Value = match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(collection, error = %e, "unparseable list response");
                return Vec::new();
            }
        };

        let mut records = normalize_envelope(body);
        // The API is expected to order by created_at already; re-sorting
        // keeps the contract when it does not.
        sort_newest_first(&mut records);
        records
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        let patch_keys: Vec<&str> = patch
            .as_object()
            .map(|obj| obj.keys().map(String::as_str).collect())
            .unwrap_or_default();

        let req = if collection == keys::REVIEWS && patch_keys == ["helpful"] {
            self.client
                .put(self.url(&format!("{collection}/{id}/helpful")))
                .json(&patch)
        } else if collection == keys::SUBMISSIONS
            && !patch_keys.is_empty()
            && patch_keys.iter().all(|k| *k == "status" || *k == "reviewed")
        {
            self.client
                .put(self.url(&format!("{collection}/{id}/status")))
                .json(&patch)
        } else {
            self.client
                .put(self.url(&format!("{collection}/{id}")))
                .json(&patch)
        };

        let resp = self.authorized(req).send().await.map_err(transport)?;
        if !resp.status().is_success() {
            return Err(reject(collection, Some(id), resp).await);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let resp = self
            .authorized(self.client.delete(self.url(&format!("{collection}/{id}"))))
            .send()
            .await
            .map_err(transport)?;
        // Deleting an absent record is a success.
        if resp.status() == StatusCode::NOT_FOUND || resp.status().is_success() {
            return Ok(());
        }
        Err(reject(collection, None, resp).await)
    }
}

// ============ Identity ============

pub struct RestIdentity {
    base_url: String,
    client: reqwest::Client,
    kv: Kv,
}

impl RestIdentity {
    pub fn new(config: &RestConfig, kv: Kv) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: client(config.timeout_secs),
            kv,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Parse a `{token, user}` auth response, persisting the token.
    fn accept_session(&self, body: Value) -> Result<User, AuthError> {
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::Unavailable("auth response carried no token".into()))?;
        self.kv
            .write_json(keys::AUTH_TOKEN, &token)
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let user = body
            .get("user")
            .cloned()
            .ok_or_else(|| AuthError::Unavailable("auth response carried no user".into()))?;
        serde_json::from_value::<User>(normalize_record(user))
            .map(User::sanitized)
            .map_err(|e| AuthError::Unavailable(e.to_string()))
    }
}

async fn auth_failure(resp: reqwest::Response, duplicate: bool) -> AuthError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return AuthError::InvalidCredentials;
    }
    if duplicate && (status == StatusCode::CONFLICT || body.contains("exists")) {
        return AuthError::EmailTaken;
    }
    if status.is_client_error() {
        return AuthError::Validation(body);
    }
    AuthError::Unavailable(format!("auth API error {status}: {body}"))
}

#[async_trait]
impl Identity for RestIdentity {
    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
        let resp = self
            .client
            .post(self.url("auth/register"))
            .json(&json!({"email": email, "password": password, "name": name}))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(auth_failure(resp, true).await);
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        self.accept_session(body)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let resp = self
            .client
            .post(self.url("auth/login"))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(auth_failure(resp, false).await);
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        self.accept_session(body)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.kv
            .remove(keys::AUTH_TOKEN)
            .map_err(|e| AuthError::Unavailable(e.to_string()))
    }

    async fn current_user(&self) -> Option<User> {
        let token: String = self.kv.read_json(keys::AUTH_TOKEN)?;
        let resp = self
            .client
            .get(self.url("auth/me"))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: Value = resp.json().await.ok()?;
        // Accept either the bare user or a `{user: ...}` envelope.
        let user = body.get("user").cloned().unwrap_or(body);
        serde_json::from_value::<User>(normalize_record(user))
            .ok()
            .map(User::sanitized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_accepts_all_three_shapes() {
        let bare = normalize_envelope(json!([{"id": "1"}, {"id": "2"}]));
        assert_eq!(bare.len(), 2);

        let wrapped = normalize_envelope(json!({"data": [{"id": "1"}]}));
        assert_eq!(wrapped.len(), 1);

        let single = normalize_envelope(json!({"id": "1", "comment": "x"}));
        assert_eq!(single.len(), 1);
        assert_eq!(single[0]["comment"], "x");
    }

    #[test]
    fn backend_id_field_is_aliased() {
        let record = normalize_record(json!({"_id": "abc123", "rating": 5}));
        assert_eq!(record["id"], "abc123");

        // An existing id wins over _id.
        let record = normalize_record(json!({"_id": "abc", "id": "kept"}));
        assert_eq!(record["id"], "kept");
    }
}
