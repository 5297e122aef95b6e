//! Supabase backend: PostgREST for collections, GoTrue for identity.
//!
//! Filters become native `col=eq.val` predicates and ordering is pushed
//! down as `order=created_at.desc`. Like the Firestore adapter,
//! construction fails fast when the project URL or anon key is missing so
//! the selection factory can fall back to the local store.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::config::SupabaseConfig;
use crate::kv::Kv;
use crate::models::{Role, User, UserStatus};
use crate::store::{
    keys, now_iso, AuthError, Backend, Identity, RecordFilters, SaveReceipt, StoreError,
};

#[derive(Debug)]
pub struct SupabaseStore {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    /// Fails fast when the project is not configured; the caller falls
    /// back to the local store.
    pub fn new(config: &SupabaseConfig) -> Result<Self, StoreError> {
        if config.url.is_empty() || config.anon_key.is_empty() {
            return Err(StoreError::unavailable(
                "supabase.url and supabase.anon_key are required",
            ));
        }
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
        })
    }

    fn table_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{collection}", self.base_url)
    }

    fn keyed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::unavailable(e.to_string())
}

#[async_trait]
impl Backend for SupabaseStore {
    async fn save(&self, collection: &str, mut value: Value) -> Result<SaveReceipt, StoreError> {
        let obj = value
            .as_object_mut()
            .ok_or_else(|| StoreError::unavailable("record must be a JSON object"))?;
        let id = match obj.get("id").and_then(Value::as_str) {
            Some(existing) if !existing.is_empty() => existing.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        obj.insert("id".to_string(), json!(id));
        obj.entry("created_at".to_string())
            .or_insert_with(|| json!(now_iso()));

        let resp = self
            .keyed(self.client.post(self.table_url(collection)))
            .header("Prefer", "return=representation")
            .json(&value)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::unavailable(format!(
                "supabase insert {status}: {text}"
            )));
        }
        Ok(SaveReceipt { id })
    }

    async fn get(&self, collection: &str, filters: &RecordFilters) -> Vec<Value> {
        let mut query: Vec<(String, String)> = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "created_at.desc".to_string()),
        ];
        for (field, value) in filters.as_pairs() {
            query.push((field.to_string(), format!("eq.{value}")));
        }

        let resp = match self
            .keyed(self.client.get(self.table_url(collection)).query(&query))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(collection, status = %resp.status(), "supabase select rejected");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(collection, error = %e, "supabase select failed");
                return Vec::new();
            }
        };

        match resp.json::<Vec<Value>>().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(collection, error = %e, "unparseable supabase response");
                Vec::new()
            }
        }
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        let mut patch_obj = match patch {
            Value::Object(obj) => obj,
            _ => return Err(StoreError::unavailable("patch must be a JSON object")),
        };
        patch_obj.insert("updated_at".to_string(), json!(now_iso()));

        let resp = self
            .keyed(self.client.patch(self.table_url(collection)))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch_obj)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::unavailable(format!(
                "supabase update {status}: {text}"
            )));
        }

        // PostgREST reports an empty representation when the predicate
        // matched nothing.
        let rows: Vec<Value> = resp.json().await.map_err(transport)?;
        if rows.is_empty() {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let resp = self
            .keyed(self.client.delete(self.table_url(collection)))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(transport)?;
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Err(StoreError::unavailable(format!(
            "supabase delete {status}: {text}"
        )))
    }
}

// ============ Identity ============

pub struct SupabaseIdentity {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
    kv: Kv,
}

impl SupabaseIdentity {
    pub fn new(config: &SupabaseConfig, kv: Kv) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            kv,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn decode_user(payload: &Value) -> User {
        let account = payload.get("user").unwrap_or(payload);
        let name = account["user_metadata"]["name"]
            .as_str()
            .or_else(|| account["user_metadata"]["full_name"].as_str())
            .unwrap_or_default();
        User {
            id: account["id"].as_str().unwrap_or_default().to_string(),
            email: account["email"].as_str().unwrap_or_default().to_string(),
            password_digest: None,
            name: name.to_string(),
            role: Role::User,
            status: UserStatus::Active,
            created_at: account["created_at"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(now_iso),
            updated_at: None,
        }
    }

    fn remember_token(&self, payload: &Value) -> Result<(), AuthError> {
        if let Some(token) = payload["access_token"].as_str() {
            self.kv
                .write_json(keys::AUTH_TOKEN, &token)
                .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        }
        Ok(())
    }
}

async fn gotrue_failure(resp: reqwest::Response, duplicate: bool) -> AuthError {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or_default();
    let message = body["msg"]
        .as_str()
        .or_else(|| body["error_description"].as_str())
        .or_else(|| body["message"].as_str())
        .unwrap_or_default()
        .to_string();

    if duplicate && message.to_lowercase().contains("already registered") {
        return AuthError::EmailTaken;
    }
    if message.to_lowercase().contains("invalid login") {
        return AuthError::InvalidCredentials;
    }
    if status.as_u16() == 400 || status.as_u16() == 401 {
        return AuthError::InvalidCredentials;
    }
    AuthError::Unavailable(format!("gotrue error {status}: {message}"))
}

#[async_trait]
impl Identity for SupabaseIdentity {
    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
        let resp = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": {"name": name}
            }))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(gotrue_failure(resp, true).await);
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        self.remember_token(&payload)?;
        Ok(Self::decode_user(&payload))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let resp = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(gotrue_failure(resp, false).await);
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        self.remember_token(&payload)?;
        Ok(Self::decode_user(&payload))
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
            .get(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let payload: Value = resp.json().await.ok()?;
        Some(Self::decode_user(&payload))
    }
}
