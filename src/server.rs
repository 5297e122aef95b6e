//! HTTP server exposing the collection and auth wire shape.
//!
//! This is the same API the REST backend adapter consumes, served over
//! whatever backend this process was configured with, so a `tdx serve`
//! instance can act as the remote end of another instance running with
//! `storage.backend = "rest"`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Name and version |
//! | `GET`  | `/tools` | The full static catalog |
//! | `GET`  | `/tools/search` | Query pipeline result page |
//! | `POST` | `/{collection}` | Create a record |
//! | `GET`  | `/{collection}` | List records (filters in the query string) |
//! | `PUT`  | `/{collection}/{id}` | Patch a record |
//! | `PUT`  | `/reviews/{id}/helpful` | Increment the helpful counter |
//! | `PUT`  | `/submissions/{id}/status` | Move a submission's status |
//! | `DELETE` | `/{collection}/{id}` | Delete a record (idempotent) |
//! | `POST` | `/auth/register`, `/auth/login` | Issue `{token, user}` |
//! | `GET`  | `/auth/me` | Bearer-token user lookup |
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no record 'x' in collection 'reviews'" } }
//! ```
//!
//! Codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{SubmissionStatus, Tool, User};
use crate::prefs;
use crate::query::{self, BrowseState};
use crate::store::{keys, AuthError, RecordFilters, Stack, StoreError};
use crate::{catalog, reviews, submissions};

/// Collections a client may address directly.
const COLLECTIONS: [&str; 3] = [keys::REVIEWS, keys::SUBMISSIONS, keys::USERS];

#[derive(Clone)]
struct AppState {
    stack: Stack,
    tools: Arc<Vec<Tool>>,
    page_size: usize,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config, stack: Stack) -> anyhow::Result<()> {
    let tools = Arc::new(catalog::load(&config.catalog)?);
    let state = AppState {
        stack,
        tools,
        page_size: config.catalog.page_size,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/tools", get(handle_tools))
        .route("/tools/search", get(handle_search))
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route("/auth/me", get(handle_me))
        .route("/reviews/{id}/helpful", put(handle_helpful))
        .route("/submissions/{id}/status", put(handle_status))
        .route("/{collection}", post(handle_create).get(handle_list))
        .route(
            "/{collection}/{id}",
            put(handle_update).delete(handle_delete),
        )
        .layer(cors)
        .with_state(state);

    let bind = &config.server.bind;
    println!("tooldex API listening on http://{bind}");

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: err.to_string(),
            },
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::unauthorized(err.to_string()),
            AuthError::Blocked => Self {
                status: StatusCode::FORBIDDEN,
                code: "forbidden",
                message: err.to_string(),
            },
            AuthError::EmailTaken | AuthError::Validation(_) => {
                Self::bad_request(err.to_string())
            }
            AuthError::Unavailable(message) => Self::internal(message),
        }
    }
}

fn check_collection(collection: &str) -> Result<(), AppError> {
    if COLLECTIONS.contains(&collection) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "unknown collection: {collection}"
        )))
    }
}

// ============ Catalog handlers ============

async fn handle_health() -> Json<Value> {
    Json(json!({ "name": "tooldex", "version": env!("CARGO_PKG_VERSION") }))
}

async fn handle_tools(State(state): State<AppState>) -> Json<Vec<Tool>> {
    Json(state.tools.as_ref().clone())
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let partial =
        prefs::partial_from_pairs(params.iter().map(|(k, v)| (k.as_str(), v.clone())));
    let browse = apply_partial(partial);

    let page = query::run(&state.tools, &browse, state.page_size);
    Json(json!({
        "tools": page.tools,
        "total": page.total,
        "total_pages": page.total_pages,
        "page": page.page,
    }))
}

fn apply_partial(partial: prefs::PartialState) -> BrowseState {
    let mut state = BrowseState::default();
    if let Some(v) = partial.search {
        state.search = v;
    }
    if let Some(v) = partial.category {
        state.category = v;
    }
    if let Some(v) = partial.pricing {
        state.pricing = v;
    }
    if let Some(v) = partial.popularity {
        state.popularity = v;
    }
    if let Some(v) = partial.sort {
        state.sort = v;
    }
    if let Some(v) = partial.page {
        state.page = v;
    }
    state
}

// ============ Collection handlers ============

async fn handle_create(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(record): Json<Value>,
) -> Result<Json<Value>, AppError> {
    check_collection(&collection)?;
    if !record.is_object() {
        return Err(AppError::bad_request("record must be a JSON object"));
    }
    let receipt = state.stack.backend.save(&collection, record).await?;
    Ok(Json(json!({ "success": true, "id": receipt.id })))
}

async fn handle_list(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Value>>, AppError> {
    check_collection(&collection)?;
    let filters = RecordFilters {
        tool_id: params.get("tool_id").cloned(),
        user_id: params.get("user_id").cloned(),
        status: params.get("status").cloned(),
    };
    Ok(Json(state.stack.backend.get(&collection, &filters).await))
}

async fn handle_update(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, AppError> {
    check_collection(&collection)?;
    if !patch.is_object() {
        return Err(AppError::bad_request("patch must be a JSON object"));
    }
    state.stack.backend.update(&collection, &id, patch).await?;
    Ok(Json(json!({ "success": true })))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    check_collection(&collection)?;
    state.stack.backend.delete(&collection, &id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Map a service-layer failure onto the wire contract: missing records
/// are 404, everything else is internal.
fn service_error(e: anyhow::Error) -> AppError {
    let not_found = e.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { .. })
        )
    }) || e.to_string().starts_with("no review");
    if not_found {
        AppError {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: e.to_string(),
        }
    } else {
        AppError::internal(format!("{e:#}"))
    }
}

async fn handle_helpful(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let helpful = reviews::mark_helpful(state.stack.backend.as_ref(), &id)
        .await
        .map_err(service_error)?;
    Ok(Json(json!({ "success": true, "helpful": helpful })))
}

async fn handle_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .and_then(SubmissionStatus::parse)
        .ok_or_else(|| {
            AppError::bad_request("status must be pending, approved, or rejected")
        })?;
    submissions::set_status(state.stack.backend.as_ref(), &id, status)
        .await
        .map_err(service_error)?;
    Ok(Json(json!({ "success": true })))
}

// ============ Auth handlers ============

/// Issue an opaque token for a signed-in user and remember it in the
/// server-side token table.
fn issue_token(state: &AppState, user: &User) -> Result<String, AppError> {
    let token = Uuid::new_v4().simple().to_string();
    let mut sessions: HashMap<String, User> =
        state.stack.kv.read_json(keys::SESSIONS).unwrap_or_default();
    sessions.insert(token.clone(), user.clone());
    state
        .stack
        .kv
        .write_json(keys::SESSIONS, &sessions)
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(token)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn handle_register(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let name = body["name"].as_str().unwrap_or_default();

    let user = state.stack.identity.sign_up(email, password, name).await?;
    let token = issue_token(&state, &user)?;
    Ok(Json(json!({ "token": token, "user": user })))
}

async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    let user = state.stack.identity.sign_in(email, password).await?;
    let token = issue_token(&state, &user)?;
    Ok(Json(json!({ "token": token, "user": user })))
}

async fn handle_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let token = bearer(&headers).ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    let sessions: HashMap<String, User> =
        state.stack.kv.read_json(keys::SESSIONS).unwrap_or_default();
    match sessions.get(&token) {
        Some(user) => Ok(Json(user.clone())),
        None => Err(AppError::unauthorized("unknown token")),
    }
}
