//! Local storage backend and identity over the [`Kv`] namespace.
//!
//! A collection is one JSON array blob under the collection's key.
//! Filtering and sorting happen in process after deserializing the whole
//! collection, which is fine at the sizes this store sees. The identity
//! implementation keeps a `users` collection plus a separate `session`
//! marker key, and stores a salted sha256 digest instead of the password.

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::kv::Kv;
use crate::models::{Role, User, UserStatus};
use crate::store::{
    keys, now_iso, sort_newest_first, AuthError, Backend, Identity, RecordFilters, SaveReceipt,
    StoreError,
};

#[derive(Clone)]
pub struct LocalStore {
    kv: Kv,
}

impl LocalStore {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Kv {
        &self.kv
    }

    fn load(&self, collection: &str) -> Vec<Value> {
        self.kv.read_json(collection).unwrap_or_default()
    }

    fn persist(&self, collection: &str, records: &[Value]) -> Result<(), StoreError> {
        self.kv
            .write_json(collection, &records)
            .map_err(|e| StoreError::unavailable(format!("write '{collection}': {e}")))
    }
}

#[async_trait]
impl Backend for LocalStore {
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

        let mut records = self.load(collection);
        records.push(value);
        self.persist(collection, &records)?;

        Ok(SaveReceipt { id })
    }

    async fn get(&self, collection: &str, filters: &RecordFilters) -> Vec<Value> {
        let mut records: Vec<Value> = self
            .load(collection)
            .into_iter()
            .filter(|r| filters.matches(r))
            .collect();
        sort_newest_first(&mut records);
        records
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        let patch_obj = match patch.as_object() {
            Some(obj) => obj.clone(),
            None => return Err(StoreError::unavailable("patch must be a JSON object")),
        };

        let mut records = self.load(collection);
        let target = records
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        // The merge happens on the loaded copy; the stored collection
        // only changes if the write below commits.
        let obj = target
            .as_object_mut()
            .ok_or_else(|| StoreError::unavailable("stored record is not an object"))?;
        for (key, val) in patch_obj {
            obj.insert(key, val);
        }
        obj.insert("updated_at".to_string(), json!(now_iso()));

        self.persist(collection, &records)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut records = self.load(collection);
        let before = records.len();
        records.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
        if records.len() == before {
            // Already absent: idempotent success, skip the write.
            return Ok(());
        }
        self.persist(collection, &records)
    }
}

// ============ Identity ============

pub struct LocalIdentity {
    store: LocalStore,
}

impl LocalIdentity {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    fn find_by_email(&self, email: &str) -> Option<User> {
        let normalized = email.trim().to_lowercase();
        self.store
            .load(keys::USERS)
            .into_iter()
            .filter_map(|v| serde_json::from_value::<User>(v).ok())
            .find(|u| u.email == normalized)
    }
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn make_digest(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest_password(&salt, password))
}

fn verify_digest(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => digest_password(salt, password) == digest,
        None => false,
    }
}

fn validate_signup(email: &str, password: &str, name: &str) -> Result<(), AuthError> {
    if !email.contains('@') {
        return Err(AuthError::Validation("Invalid email address".to_string()));
    }
    if password.len() < 6 {
        return Err(AuthError::Validation(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    if name.trim().is_empty() {
        return Err(AuthError::Validation("Name is required".to_string()));
    }
    Ok(())
}

#[async_trait]
impl Identity for LocalIdentity {
    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
        validate_signup(email, password, name)?;
        if self.find_by_email(email).is_some() {
            return Err(AuthError::EmailTaken);
        }

        // Bootstrap: the first account in a fresh store owns the back
        // office. Everyone after that starts as a plain user.
        let role = if self.store.load(keys::USERS).is_empty() {
            Role::Admin
        } else {
            Role::User
        };

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.trim().to_lowercase(),
            password_digest: Some(make_digest(password)),
            name: name.trim().to_string(),
            role,
            status: UserStatus::Active,
            created_at: now_iso(),
            updated_at: None,
        };

        let record = serde_json::to_value(&user).map_err(|e| AuthError::Unavailable(e.to_string()))?;
        self.store
            .save(keys::USERS, record)
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let user = user.sanitized();
        self.store
            .kv
            .write_json(keys::SESSION, &user)
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .find_by_email(email)
            .ok_or(AuthError::InvalidCredentials)?;
        let digest = user
            .password_digest
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_digest(digest, password) {
            return Err(AuthError::InvalidCredentials);
        }
        if user.is_blocked() {
            return Err(AuthError::Blocked);
        }

        let user = user.sanitized();
        self.store
            .kv
            .write_json(keys::SESSION, &user)
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.store
            .kv
            .remove(keys::SESSION)
            .map_err(|e| AuthError::Unavailable(e.to_string()))
    }

    async fn current_user(&self) -> Option<User> {
        self.store.kv.read_json(keys::SESSION)
    }
}
