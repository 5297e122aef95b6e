//! Firestore backend over the documents REST API, plus Identity Toolkit
//! auth.
//!
//! Construction is fallible on purpose: a missing project id or API key
//! fails fast so the selection factory can substitute the local store.
//! Records keep the same JSON shape as every other backend; fields are
//! encoded to and from Firestore's typed value JSON at the wire boundary,
//! and the document id is pinned to the record's `id` field so the two
//! never diverge.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::config::FirestoreConfig;
use crate::kv::Kv;
use crate::models::{Role, User, UserStatus};
use crate::store::{
    keys, now_iso, sort_newest_first, AuthError, Backend, Identity, RecordFilters, SaveReceipt,
    StoreError,
};

const IDENTITY_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Debug)]
pub struct FirestoreStore {
    documents_url: String,
    run_query_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl FirestoreStore {
    /// Fails fast when the service is not configured; the caller falls
    /// back to the local store.
    pub fn new(config: &FirestoreConfig) -> Result<Self, StoreError> {
        if config.project_id.is_empty() || config.api_key.is_empty() {
            return Err(StoreError::unavailable(
                "firestore.project_id and firestore.api_key are required",
            ));
        }
        let parent = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
            config.project_id
        );
        Ok(Self {
            run_query_url: format!("{parent}:runQuery"),
            documents_url: parent,
            api_key: config.api_key.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
        })
    }

    fn doc_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{collection}/{id}?key={}",
            self.documents_url, self.api_key
        )
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::unavailable(e.to_string())
}

// ============ Typed value encoding ============

/// Encode a JSON value as a Firestore typed value.
fn to_fire(value: &Value) -> Value {
    match value {
        Value::Null => json!({"nullValue": null}),
        Value::Bool(b) => json!({"booleanValue": b}),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                // Firestore carries integers as strings.
                json!({"integerValue": i.to_string()})
            } else {
                json!({"doubleValue": n.as_f64()})
            }
        }
        Value::String(s) => json!({"stringValue": s}),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_fire).collect();
            json!({"arrayValue": {"values": values}})
        }
        Value::Object(map) => json!({"mapValue": {"fields": to_fire_fields(map)}}),
    }
}

fn to_fire_fields(map: &Map<String, Value>) -> Value {
    let fields: Map<String, Value> = map.iter().map(|(k, v)| (k.clone(), to_fire(v))).collect();
    Value::Object(fields)
}

/// Decode a Firestore typed value back into plain JSON.
fn from_fire(value: &Value) -> Value {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return Value::Null,
    };
    if let Some(s) = obj.get("stringValue").and_then(Value::as_str) {
        return json!(s);
    }
    if let Some(s) = obj.get("integerValue").and_then(Value::as_str) {
        return s.parse::<i64>().map(|i| json!(i)).unwrap_or(Value::Null);
    }
    if let Some(f) = obj.get("doubleValue").and_then(Value::as_f64) {
        return json!(f);
    }
    if let Some(b) = obj.get("booleanValue").and_then(Value::as_bool) {
        return json!(b);
    }
    if obj.contains_key("nullValue") {
        return Value::Null;
    }
    if let Some(arr) = obj.get("arrayValue") {
        let items = arr
            .get("values")
            .and_then(Value::as_array)
            .map(|vs| vs.iter().map(from_fire).collect())
            .unwrap_or_default();
        return Value::Array(items);
    }
    if let Some(map) = obj.get("mapValue") {
        return from_fire_fields(map.get("fields").unwrap_or(&Value::Null));
    }
    Value::Null
}

fn from_fire_fields(fields: &Value) -> Value {
    let map = match fields.as_object() {
        Some(map) => map,
        None => return json!({}),
    };
    let decoded: Map<String, Value> = map.iter().map(|(k, v)| (k.clone(), from_fire(v))).collect();
    Value::Object(decoded)
}

fn decode_document(doc: &Value) -> Option<Value> {
    let fields = doc.get("fields")?;
    Some(from_fire_fields(fields))
}

#[async_trait]
impl Backend for FirestoreStore {
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

        let url = format!(
            "{}/{collection}?documentId={id}&key={}",
            self.documents_url, self.api_key
        );
        let body = json!({"fields": to_fire_fields(value.as_object().unwrap_or(&Map::new()))});
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::unavailable(format!(
                "firestore create {status}: {text}"
            )));
        }
        Ok(SaveReceipt { id })
    }

    async fn get(&self, collection: &str, filters: &RecordFilters) -> Vec<Value> {
        let field_filters: Vec<Value> = filters
            .as_pairs()
            .into_iter()
            .map(|(field, value)| {
                json!({
                    "fieldFilter": {
                        "field": {"fieldPath": field},
                        "op": "EQUAL",
                        "value": {"stringValue": value}
                    }
                })
            })
            .collect();

        let mut query = json!({
            "structuredQuery": {
                "from": [{"collectionId": collection}]
            }
        });
        if !field_filters.is_empty() {
            // Ordering stays client-side so filtered queries need no
            // composite index.
            query["structuredQuery"]["where"] = json!({
                "compositeFilter": {"op": "AND", "filters": field_filters}
            });
        }

        let url = format!("{}?key={}", self.run_query_url, self.api_key);
        let resp = match self.client.post(url).json(&query).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(collection, status = %resp.status(), "firestore query rejected");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(collection, error = %e, "firestore query failed");
                return Vec::new();
            }
        };

        let rows: Vec<Value> = match resp.json().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(collection, error = %e, "unparseable firestore response");
                return Vec::new();
            }
        };

        let mut records: Vec<Value> = rows
            .iter()
            .filter_map(|row| row.get("document"))
            .filter_map(decode_document)
            .collect();
        sort_newest_first(&mut records);
        records
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        let mut patch_obj = match patch {
            Value::Object(obj) => obj,
            _ => return Err(StoreError::unavailable("patch must be a JSON object")),
        };
        patch_obj.insert("updated_at".to_string(), json!(now_iso()));

        // Patch only the named fields and require the document to exist.
        let mut url = format!(
            "{}&currentDocument.exists=true",
            self.doc_url(collection, id)
        );
        for field in patch_obj.keys() {
            url.push_str("&updateMask.fieldPaths=");
            url.push_str(field);
        }

        let body = json!({"fields": to_fire_fields(&patch_obj)});
        let resp = self
            .client
            .patch(url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(StoreError::not_found(collection, id))
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(StoreError::unavailable(format!(
                "firestore update {status}: {text}"
            )))
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let resp = self
            .client
            .delete(self.doc_url(collection, id))
            .send()
            .await
            .map_err(transport)?;
        // Firestore deletes are already idempotent.
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Err(StoreError::unavailable(format!(
            "firestore delete {status}: {text}"
        )))
    }
}

// ============ Identity ============

pub struct FirestoreIdentity {
    api_key: String,
    client: reqwest::Client,
    kv: Kv,
}

impl FirestoreIdentity {
    pub fn new(config: &FirestoreConfig, kv: Kv) -> Self {
        Self {
            api_key: config.api_key.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            kv,
        }
    }

    async fn account_call(&self, action: &str, body: Value) -> Result<Value, AuthError> {
        let url = format!("{IDENTITY_BASE}/accounts:{action}?key={}", self.api_key);
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        if status.is_success() {
            return Ok(payload);
        }

        let code = payload["error"]["message"].as_str().unwrap_or_default();
        match code {
            "EMAIL_EXISTS" => Err(AuthError::EmailTaken),
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
                Err(AuthError::InvalidCredentials)
            }
            "USER_DISABLED" => Err(AuthError::Blocked),
            other => Err(AuthError::Unavailable(format!(
                "identity API error {status}: {other}"
            ))),
        }
    }

    fn remember(&self, payload: &Value, name: &str) -> Result<User, AuthError> {
        let token = payload["idToken"].as_str().unwrap_or_default();
        if token.is_empty() {
            return Err(AuthError::Unavailable("auth response carried no token".into()));
        }
        self.kv
            .write_json(keys::AUTH_TOKEN, &token)
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        Ok(User {
            id: payload["localId"].as_str().unwrap_or_default().to_string(),
            email: payload["email"].as_str().unwrap_or_default().to_string(),
            password_digest: None,
            name: name.to_string(),
            role: Role::User,
            status: UserStatus::Active,
            created_at: now_iso(),
            updated_at: None,
        })
    }
}

#[async_trait]
impl Identity for FirestoreIdentity {
    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
        let payload = self
            .account_call(
                "signUp",
                json!({
                    "email": email,
                    "password": password,
                    "displayName": name,
                    "returnSecureToken": true
                }),
            )
            .await?;
        self.remember(&payload, name)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let payload = self
            .account_call(
                "signInWithPassword",
                json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true
                }),
            )
            .await?;
        let name = payload["displayName"].as_str().unwrap_or_default();
        self.remember(&payload, name)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.kv
            .remove(keys::AUTH_TOKEN)
            .map_err(|e| AuthError::Unavailable(e.to_string()))
    }

    async fn current_user(&self) -> Option<User> {
        let token: String = self.kv.read_json(keys::AUTH_TOKEN)?;
        let payload = self
            .account_call("lookup", json!({"idToken": token}))
            .await
            .ok()?;
        let account = payload["users"].as_array()?.first()?;
        Some(User {
            id: account["localId"].as_str().unwrap_or_default().to_string(),
            email: account["email"].as_str().unwrap_or_default().to_string(),
            password_digest: None,
            name: account["displayName"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            role: Role::User,
            status: UserStatus::Active,
            created_at: now_iso(),
            updated_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_values_round_trip() {
        let record = json!({
            "id": "r1",
            "rating": 5,
            "score": 4.5,
            "visible": true,
            "email": null,
            "tags": ["a", "b"],
            "nested": {"helpful": 3}
        });
        let encoded = to_fire_fields(record.as_object().unwrap());
        let decoded = from_fire_fields(&encoded);
        assert_eq!(decoded, record);
    }

    #[test]
    fn unconfigured_service_fails_fast() {
        let err = FirestoreStore::new(&FirestoreConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }
}
