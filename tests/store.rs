//! Library-level tests of the storage contract against the local
//! adapter: record lifecycle, degradation, and identity rules.

use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

use tooldex::config::Config;
use tooldex::kv::Kv;
use tooldex::store::{self, Backend, Identity, RecordFilters, StoreError};
use tooldex::store_local::{LocalIdentity, LocalStore};

fn fresh() -> (TempDir, LocalStore) {
    let tmp = TempDir::new().unwrap();
    let kv = Kv::open(tmp.path()).unwrap();
    (tmp, LocalStore::new(kv))
}

#[tokio::test]
async fn saved_records_survive_a_fresh_adapter_instance() {
    let tmp = TempDir::new().unwrap();

    let receipt = {
        let store = LocalStore::new(Kv::open(tmp.path()).unwrap());
        store
            .save(
                "reviews",
                json!({"tool_id": "2", "rating": 5, "comment": "keeps context"}),
            )
            .await
            .unwrap()
    };

    // A brand-new adapter over the same medium sees the record.
    let store = LocalStore::new(Kv::open(tmp.path()).unwrap());
    let records = store.get("reviews", &RecordFilters::by_tool("2")).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], json!(receipt.id));
    assert_eq!(records[0]["comment"], "keeps context");
    assert!(records[0]["created_at"].is_string());
}

#[tokio::test]
async fn save_assigns_id_and_created_at() {
    let (_tmp, store) = fresh();
    let receipt = store.save("reviews", json!({"rating": 3})).await.unwrap();
    assert!(!receipt.id.is_empty());

    let records = store.get("reviews", &RecordFilters::none()).await;
    assert_eq!(records[0]["id"], json!(receipt.id));
    assert!(records[0]["created_at"].is_string());
}

#[tokio::test]
async fn repeated_update_is_idempotent_on_content() {
    let (_tmp, store) = fresh();
    let receipt = store
        .save("submissions", json!({"name": "X", "status": "pending"}))
        .await
        .unwrap();

    let patch = json!({"status": "approved", "reviewed": true});
    store
        .update("submissions", &receipt.id, patch.clone())
        .await
        .unwrap();
    let first = store.get("submissions", &RecordFilters::none()).await;
    let first_updated = first[0]["updated_at"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(10)).await;
    store
        .update("submissions", &receipt.id, patch)
        .await
        .unwrap();
    let second = store.get("submissions", &RecordFilters::none()).await;
    let second_updated = second[0]["updated_at"].as_str().unwrap().to_string();

    // The timestamp moves both times, everything else is stable.
    assert_ne!(first_updated, second_updated);
    let strip = |mut v: Value| {
        v.as_object_mut().unwrap().remove("updated_at");
        v
    };
    assert_eq!(strip(first[0].clone()), strip(second[0].clone()));
}

#[tokio::test]
async fn deleting_a_missing_record_succeeds() {
    let (_tmp, store) = fresh();
    store.delete("reviews", "never-existed").await.unwrap();

    let receipt = store.save("reviews", json!({"rating": 1})).await.unwrap();
    store.delete("reviews", &receipt.id).await.unwrap();
    store.delete("reviews", &receipt.id).await.unwrap();
    assert!(store.get("reviews", &RecordFilters::none()).await.is_empty());
}

#[tokio::test]
async fn update_on_missing_record_is_not_found() {
    let (_tmp, store) = fresh();
    let err = store
        .update("reviews", "ghost", json!({"rating": 2}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn corrupt_collection_blob_reads_as_empty() {
    let tmp = TempDir::new().unwrap();
    let kv = Kv::open(tmp.path()).unwrap();
    kv.write("reviews", "not json at all").unwrap();

    let store = LocalStore::new(kv);
    assert!(store.get("reviews", &RecordFilters::none()).await.is_empty());

    // Writing through the adapter recovers the collection.
    store.save("reviews", json!({"rating": 4})).await.unwrap();
    assert_eq!(store.get("reviews", &RecordFilters::none()).await.len(), 1);
}

#[tokio::test]
async fn listing_is_newest_first() {
    let (_tmp, store) = fresh();
    store
        .save("reviews", json!({"comment": "older", "created_at": "2024-01-01T00:00:00.000Z"}))
        .await
        .unwrap();
    store
        .save("reviews", json!({"comment": "newer", "created_at": "2024-06-01T00:00:00.000Z"}))
        .await
        .unwrap();

    let records = store.get("reviews", &RecordFilters::none()).await;
    assert_eq!(records[0]["comment"], "newer");
    assert_eq!(records[1]["comment"], "older");
}

#[tokio::test]
async fn duplicate_email_signup_leaves_the_first_account_alone() {
    let (_tmp, store) = fresh();
    let identity = LocalIdentity::new(store.clone());

    let first = identity
        .sign_up("dana@example.com", "secret1", "Dana")
        .await
        .unwrap();

    let err = identity
        .sign_up("dana@example.com", "other-password", "Impostor")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Email already exists");

    let users = store.get("users", &RecordFilters::none()).await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], json!(first.id));
    assert_eq!(users[0]["name"], "Dana");

    // The original credentials still work.
    assert!(identity.sign_in("dana@example.com", "secret1").await.is_ok());
}

#[tokio::test]
async fn unconfigured_managed_backend_falls_back_to_local() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.backend = "firestore".to_string();
    config.storage.path = tmp.path().join("store");

    let stack = store::open(&config).unwrap();
    let receipt = stack
        .backend
        .save("reviews", json!({"rating": 5}))
        .await
        .unwrap();

    // The record landed in the local medium, proving the substitution.
    let local = LocalStore::new(Kv::open(&config.storage.path).unwrap());
    let records = local.get("reviews", &RecordFilters::none()).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], json!(receipt.id));
}
