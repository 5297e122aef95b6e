//! Core data models for the tooldex catalog and its persisted collections.
//!
//! [`Tool`] entries are static: loaded once from the bundled dataset and
//! immutable for the life of the process. Reviews, submissions, and users
//! are collection records owned by the storage layer, which assigns their
//! `id` and timestamps.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A catalog entry. Static, read-only at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: String,
    pub image: String,
    #[serde(default, deserialize_with = "deserialize_features")]
    pub features: Vec<Feature>,
    pub pricing: String,
    pub link: String,
    pub date_added: NaiveDate,
    pub popularity: u8,
}

/// A named capability of a [`Tool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Dataset entries may list features as plain strings or as full
/// `{name, description}` objects. Plain strings become a feature with an
/// empty description.
fn deserialize_features<'de, D>(deserializer: D) -> Result<Vec<Feature>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FeatureSpec {
        Text(String),
        Full(Feature),
    }

    let specs: Vec<FeatureSpec> = Vec::deserialize(deserializer)?;
    Ok(specs
        .into_iter()
        .map(|spec| match spec {
            FeatureSpec::Text(name) => Feature {
                name,
                description: String::new(),
            },
            FeatureSpec::Full(f) => f,
        })
        .collect())
}

/// A user review of a tool.
///
/// `tool_id` references [`Tool::id`] but is not enforced as a foreign key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub tool_id: String,
    pub rating: u8,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub comment: String,
    #[serde(default)]
    pub helpful: i64,
    #[serde(default = "default_true")]
    pub visible: bool,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_true() -> bool {
    true
}

/// A community-submitted tool awaiting moderation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub status: SubmissionStatus,
    /// Derived: true iff `status != Pending`.
    #[serde(default)]
    pub reviewed: bool,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Moderation state of a [`Submission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "approved" => Some(SubmissionStatus::Approved),
            "rejected" => Some(SubmissionStatus::Rejected),
            _ => None,
        }
    }
}

/// A registered user.
///
/// `password_digest` exists only in the local identity store and is
/// stripped before a user is returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_digest: Option<String>,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: UserStatus,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl User {
    /// Copy of this user with the password digest removed.
    pub fn sanitized(mut self) -> Self {
        self.password_digest = None;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_blocked(&self) -> bool {
        self.status == UserStatus::Blocked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Blocked,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Blocked => "blocked",
        }
    }
}

/// A malformed or missing input field, caught before any storage call.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);
