//! Submission service: community tool proposals and their moderation
//! lifecycle.
//!
//! New submissions start `pending`. Approving or rejecting patches the
//! status and the derived `reviewed` flag in one update.

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::models::{Submission, SubmissionStatus, ValidationError};
use crate::store::{keys, Backend, RecordFilters};

/// Caller-supplied fields for a new submission.
#[derive(Debug, Clone)]
pub struct SubmissionInput {
    pub name: String,
    pub url: String,
    pub description: String,
    pub category: String,
    pub image: Option<String>,
}

pub fn validate(input: &SubmissionInput) -> Result<(), ValidationError> {
    if input.name.trim().is_empty() {
        return Err(ValidationError("Name is required".to_string()));
    }
    if !input.url.starts_with("http://") && !input.url.starts_with("https://") {
        return Err(ValidationError(
            "URL must start with http:// or https://".to_string(),
        ));
    }
    if input.description.trim().is_empty() {
        return Err(ValidationError("Description is required".to_string()));
    }
    if input.category.trim().is_empty() {
        return Err(ValidationError("Category is required".to_string()));
    }
    Ok(())
}

/// Validate and persist a submission in the `pending` state.
pub async fn submit(backend: &dyn Backend, input: SubmissionInput) -> Result<String> {
    validate(&input)?;

    let record = json!({
        "name": input.name.trim(),
        "url": input.url,
        "description": input.description.trim(),
        "category": input.category.trim(),
        "image": input.image,
        "status": SubmissionStatus::Pending.as_str(),
        "reviewed": false,
    });
    let receipt = backend
        .save(keys::SUBMISSIONS, record)
        .await
        .context("failed to save submission")?;
    Ok(receipt.id)
}

/// Submissions, newest first, optionally restricted to one status.
pub async fn list(backend: &dyn Backend, status: Option<SubmissionStatus>) -> Vec<Submission> {
    let filters = match status {
        Some(status) => RecordFilters::by_status(status.as_str()),
        None => RecordFilters::none(),
    };
    decode(backend.get(keys::SUBMISSIONS, &filters).await)
}

fn decode(records: Vec<Value>) -> Vec<Submission> {
    records
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Submission>(value) {
            Ok(submission) => Some(submission),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed submission record");
                None
            }
        })
        .collect()
}

/// Move a submission to a new status, keeping `reviewed` in sync.
pub async fn set_status(
    backend: &dyn Backend,
    id: &str,
    status: SubmissionStatus,
) -> Result<()> {
    backend
        .update(
            keys::SUBMISSIONS,
            id,
            json!({
                "status": status.as_str(),
                "reviewed": status != SubmissionStatus::Pending,
            }),
        )
        .await
        .context("failed to update submission status")?;
    Ok(())
}

pub async fn approve(backend: &dyn Backend, id: &str) -> Result<()> {
    set_status(backend, id, SubmissionStatus::Approved).await
}

pub async fn reject(backend: &dyn Backend, id: &str) -> Result<()> {
    set_status(backend, id, SubmissionStatus::Rejected).await
}

pub async fn remove(backend: &dyn Backend, id: &str) -> Result<()> {
    backend
        .delete(keys::SUBMISSIONS, id)
        .await
        .context("failed to delete submission")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::Kv;
    use crate::store_local::LocalStore;
    use tempfile::TempDir;

    fn input() -> SubmissionInput {
        SubmissionInput {
            name: "PromptBase".to_string(),
            url: "https://promptbase.example".to_string(),
            description: "Marketplace for prompts".to_string(),
            category: "Productivity".to_string(),
            image: None,
        }
    }

    fn backend() -> (TempDir, LocalStore) {
        let tmp = TempDir::new().unwrap();
        let kv = Kv::open(tmp.path()).unwrap();
        (tmp, LocalStore::new(kv))
    }

    #[test]
    fn validation_requires_a_real_url() {
        let mut bad = input();
        bad.url = "promptbase.example".to_string();
        assert!(validate(&bad).is_err());
        assert!(validate(&input()).is_ok());
    }

    #[tokio::test]
    async fn submissions_start_pending_and_unreviewed() {
        let (_tmp, store) = backend();
        submit(&store, input()).await.unwrap();

        let pending = list(&store, Some(SubmissionStatus::Pending)).await;
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].reviewed);
    }

    #[tokio::test]
    async fn approval_flips_status_and_reviewed() {
        let (_tmp, store) = backend();
        let id = submit(&store, input()).await.unwrap();
        approve(&store, &id).await.unwrap();

        assert!(list(&store, Some(SubmissionStatus::Pending)).await.is_empty());
        let approved = list(&store, Some(SubmissionStatus::Approved)).await;
        assert_eq!(approved.len(), 1);
        assert!(approved[0].reviewed);

        reject(&store, &id).await.unwrap();
        let rejected = list(&store, Some(SubmissionStatus::Rejected)).await;
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].reviewed);
    }

    #[tokio::test]
    async fn status_update_on_missing_id_fails() {
        let (_tmp, store) = backend();
        assert!(approve(&store, "missing").await.is_err());
    }
}
