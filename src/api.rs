use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::auth::{self, Session};
use crate::catalog::default_cards;
use crate::db;
use crate::error::{AllocationError, StoreError};
use crate::models::Card;
use crate::optimizer::{self, AllocationSummary};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/sign-up", post(sign_up))
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/cards", get(list_cards).post(create_card))
        .route("/api/cards/:id", delete(delete_card))
        .route("/api/catalog", get(catalog))
        .route("/api/optimize", post(optimize))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    Allocation(AllocationError),
    Store(StoreError),
    /// Request body could not be read as the expected JSON
    BadRequest(String),
    Internal(String),
}

impl From<AllocationError> for ApiError {
    fn from(e: AllocationError) -> Self {
        ApiError::Allocation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Allocation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Store(e) => {
                let status = match &e {
                    StoreError::Unauthenticated | StoreError::InvalidCredentials => {
                        StatusCode::UNAUTHORIZED
                    }
                    StoreError::UserExists(_) => StatusCode::CONFLICT,
                    StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    StoreError::Sqlite(_) | StoreError::Json(_) => {
                        error!(error = %e, "store failure");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => {
                error!(%message, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Store(StoreError::Unauthenticated))
}

fn session(conn: &Connection, headers: &HeaderMap) -> Result<Session, ApiError> {
    Ok(auth::authenticate(conn, bearer_token(headers)?)?)
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

async fn sign_up(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let Json(body) = body?;
    let conn = state.conn()?;
    let session = auth::sign_up(&conn, &body.email, &body.password)?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn sign_in(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Session>, ApiError> {
    let Json(body) = body?;
    let conn = state.conn()?;
    Ok(Json(auth::sign_in(&conn, &body.email, &body.password)?))
}

async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let conn = state.conn()?;
    auth::sign_out(&conn, bearer_token(&headers)?)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_cards(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Card>>, ApiError> {
    let conn = state.conn()?;
    let session = session(&conn, &headers)?;
    Ok(Json(db::list_cards(&conn, &session)?))
}

async fn create_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Card>, JsonRejection>,
) -> Result<(StatusCode, Json<Card>), ApiError> {
    let Json(mut card) = body?;
    optimizer::validate_card(&card)?;
    let conn = state.conn()?;
    let session = session(&conn, &headers)?;
    card.id = Some(db::add_card(&conn, &session, &card)?);
    card.user_id = Some(session.user_id);
    Ok((StatusCode::CREATED, Json(card)))
}

async fn delete_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let conn = state.conn()?;
    let session = session(&conn, &headers)?;
    if db::remove_card(&conn, &session, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StoreError::NotFound(format!("card {id}")).into())
    }
}

async fn catalog() -> Json<Vec<Card>> {
    Json(default_cards())
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub amount: f64,
    pub category: Option<String>,
    pub partner: Option<String>,
    /// Optimize against the built-in catalog instead of the user's cards
    #[serde(default)]
    pub use_catalog: bool,
}

async fn optimize(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<OptimizeRequest>, JsonRejection>,
) -> Result<Json<AllocationSummary>, ApiError> {
    let Json(body) = body?;
    let cards = if body.use_catalog {
        default_cards()
    } else {
        let conn = state.conn()?;
        let session = session(&conn, &headers)?;
        db::list_cards(&conn, &session)?
    };

    let results = optimizer::allocate(
        body.amount,
        &cards,
        body.category.as_deref(),
        body.partner.as_deref(),
    )?;
    Ok(Json(AllocationSummary::new(results)))
}
