//! Review service: validation, listing, the helpful counter, and
//! moderation.
//!
//! Validation happens before any storage call; a rejected input never
//! reaches the backend. Read paths decode leniently and skip corrupt
//! records instead of failing the whole listing.

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::models::{Review, ValidationError};
use crate::store::{keys, Backend, RecordFilters};

/// Caller-supplied fields for a new review.
#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub tool_id: String,
    pub rating: u8,
    pub name: String,
    pub email: Option<String>,
    pub comment: String,
}

pub fn validate(input: &ReviewInput) -> Result<(), ValidationError> {
    if input.tool_id.trim().is_empty() {
        return Err(ValidationError("A tool is required".to_string()));
    }
    if !(1..=5).contains(&input.rating) {
        return Err(ValidationError(
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    if input.name.trim().is_empty() {
        return Err(ValidationError("Name is required".to_string()));
    }
    if input.comment.trim().is_empty() {
        return Err(ValidationError("Comment must not be empty".to_string()));
    }
    if let Some(email) = &input.email {
        if !email.contains('@') {
            return Err(ValidationError("Invalid email address".to_string()));
        }
    }
    Ok(())
}

/// Validate and persist a review. Returns the assigned id.
pub async fn add(backend: &dyn Backend, input: ReviewInput) -> Result<String> {
    validate(&input)?;

    let record = json!({
        "tool_id": input.tool_id,
        "rating": input.rating,
        "name": input.name.trim(),
        "email": input.email,
        "comment": input.comment.trim(),
        "helpful": 0,
        "visible": true,
    });
    let receipt = backend
        .save(keys::REVIEWS, record)
        .await
        .context("failed to save review")?;
    Ok(receipt.id)
}

/// Reviews for a tool, newest first. Hidden reviews are excluded unless
/// `include_hidden` is set (the moderation view).
pub async fn for_tool(backend: &dyn Backend, tool_id: &str, include_hidden: bool) -> Vec<Review> {
    let records = backend
        .get(keys::REVIEWS, &RecordFilters::by_tool(tool_id))
        .await;
    decode(records)
        .into_iter()
        .filter(|r| include_hidden || r.visible)
        .collect()
}

/// Every review in the store, for moderation.
pub async fn all(backend: &dyn Backend) -> Vec<Review> {
    decode(backend.get(keys::REVIEWS, &RecordFilters::none()).await)
}

fn decode(records: Vec<Value>) -> Vec<Review> {
    records
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Review>(value) {
            Ok(review) => Some(review),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed review record");
                None
            }
        })
        .collect()
}

/// Increment the helpful counter. Returns the new count.
pub async fn mark_helpful(backend: &dyn Backend, id: &str) -> Result<i64> {
    let current = all(backend)
        .await
        .into_iter()
        .find(|r| r.id == id)
        .with_context(|| format!("no review '{id}'"))?;

    let next = current.helpful + 1;
    backend
        .update(keys::REVIEWS, id, json!({"helpful": next}))
        .await
        .context("failed to update helpful count")?;
    Ok(next)
}

/// Moderation: show or hide a review.
pub async fn set_visible(backend: &dyn Backend, id: &str, visible: bool) -> Result<()> {
    backend
        .update(keys::REVIEWS, id, json!({"visible": visible}))
        .await
        .context("failed to update review visibility")?;
    Ok(())
}

pub async fn remove(backend: &dyn Backend, id: &str) -> Result<()> {
    backend
        .delete(keys::REVIEWS, id)
        .await
        .context("failed to delete review")?;
    Ok(())
}

/// Mean rating across the given reviews, or `None` when there are none.
pub fn average_rating(reviews: &[Review]) -> Option<f64> {
    if reviews.is_empty() {
        return None;
    }
    let sum: u32 = reviews.iter().map(|r| r.rating as u32).sum();
    Some(sum as f64 / reviews.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::Kv;
    use crate::store_local::LocalStore;
    use tempfile::TempDir;

    fn input() -> ReviewInput {
        ReviewInput {
            tool_id: "3".to_string(),
            rating: 4,
            name: "Sam".to_string(),
            email: None,
            comment: "Does what it says".to_string(),
        }
    }

    fn backend() -> (TempDir, LocalStore) {
        let tmp = TempDir::new().unwrap();
        let kv = Kv::open(tmp.path()).unwrap();
        (tmp, LocalStore::new(kv))
    }

    #[test]
    fn validation_catches_bad_fields() {
        let mut bad = input();
        bad.rating = 0;
        assert!(validate(&bad).is_err());

        let mut bad = input();
        bad.rating = 6;
        assert!(validate(&bad).is_err());

        let mut bad = input();
        bad.comment = "   ".to_string();
        assert!(validate(&bad).is_err());

        let mut bad = input();
        bad.email = Some("not-an-email".to_string());
        assert!(validate(&bad).is_err());

        assert!(validate(&input()).is_ok());
    }

    #[tokio::test]
    async fn add_then_list_round_trips() {
        let (_tmp, store) = backend();
        let id = add(&store, input()).await.unwrap();

        let reviews = for_tool(&store, "3", false).await;
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].id, id);
        assert_eq!(reviews[0].helpful, 0);

        // Another tool's listing stays empty.
        assert!(for_tool(&store, "4", false).await.is_empty());
    }

    #[tokio::test]
    async fn hidden_reviews_only_show_in_moderation_view() {
        let (_tmp, store) = backend();
        let id = add(&store, input()).await.unwrap();
        set_visible(&store, &id, false).await.unwrap();

        assert!(for_tool(&store, "3", false).await.is_empty());
        assert_eq!(for_tool(&store, "3", true).await.len(), 1);
    }

    #[tokio::test]
    async fn helpful_counts_up() {
        let (_tmp, store) = backend();
        let id = add(&store, input()).await.unwrap();
        assert_eq!(mark_helpful(&store, &id).await.unwrap(), 1);
        assert_eq!(mark_helpful(&store, &id).await.unwrap(), 2);

        assert!(mark_helpful(&store, "missing").await.is_err());
    }

    #[test]
    fn average_is_mean_of_ratings() {
        assert_eq!(average_rating(&[]), None);

        let reviews: Vec<Review> = [5, 4, 3]
            .iter()
            .map(|rating| Review {
                id: String::new(),
                tool_id: "1".to_string(),
                rating: *rating,
                name: "n".to_string(),
                email: None,
                comment: "c".to_string(),
                helpful: 0,
                visible: true,
                created_at: String::new(),
                updated_at: None,
            })
            .collect();
        assert_eq!(average_rating(&reviews), Some(4.0));
    }
}
