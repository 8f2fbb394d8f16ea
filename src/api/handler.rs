use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{LendingError, unpack_error};
use crate::handler::AppState;
use crate::library::NewBook;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBook {
    pub book_id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub genre: String,
    pub total_copies: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GenreParams {
    pub genre: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoanParams {
    pub student: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoanRequest {
    pub student_id: String,
    pub book_id: String,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse { data })).into_response()
}

fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse { data })).into_response()
}

fn error(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

pub fn status_for(err: &LendingError) -> StatusCode {
    use LendingError::*;
    match err {
        StudentFlagged(_) | FlagClearingDisabled => StatusCode::FORBIDDEN,
        LoanLimitReached(_) | AlreadyBorrowed(_) | NoCopiesAvailable(_) => StatusCode::CONFLICT,
        BookNotFound(_) | NoOpenLoan(_) => StatusCode::NOT_FOUND,
        Validation(_) => StatusCode::BAD_REQUEST,
        Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: LendingError, action: &str) -> Response {
    if err.is_warning() {
        tracing::info!("refused to {}: {}", action, err);
        return error(status_for(&err), &err.to_string());
    }

    tracing::error!("Failed to {}: {}", action, unpack_error(&err));
    error(StatusCode::INTERNAL_SERVER_ERROR, &format!("Failed to {}", action))
}

// ============================================================================
// Catalog Handlers
// ============================================================================

pub async fn list_books(State(state): State<AppState>) -> Response {
    match state.library.list_books().await {
        Ok(books) => success(books),
        Err(e) => failure(e, "list books"),
    }
}

pub async fn add_book(State(state): State<AppState>, Json(payload): Json<CreateBook>) -> Response {
    let input = NewBook {
        book_id: payload.book_id,
        title: payload.title,
        author: payload.author,
        genre: payload.genre,
        total_copies: payload
            .total_copies
            .unwrap_or(state.library.policy().default_copies),
    };

    match state.library.add_book(input).await {
        Ok(book) => created(book),
        Err(e) => failure(e, "add book"),
    }
}

pub async fn list_available(State(state): State<AppState>, Query(params): Query<GenreParams>) -> Response {
    let Some(genre) = params.genre.filter(|g| !g.trim().is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "genre is required");
    };

    match state.library.list_available_by_genre(&genre).await {
        Ok(books) => success(books),
        Err(e) => failure(e, "list available books"),
    }
}

// ============================================================================
// Loan Handlers
// ============================================================================

pub async fn list_loans(State(state): State<AppState>, Query(params): Query<LoanParams>) -> Response {
    let result = match params.student.as_deref() {
        Some(student) => state.library.open_loans_for(student).await,
        None => state.library.open_loans().await,
    };

    match result {
        Ok(loans) => success(loans),
        Err(e) => failure(e, "list loans"),
    }
}

pub async fn borrow(State(state): State<AppState>, Json(payload): Json<LoanRequest>) -> Response {
    match state
        .library
        .borrow(&payload.student_id, &payload.book_id, Utc::now())
        .await
    {
        Ok(borrowed) => created(borrowed),
        Err(e) => failure(e, "borrow book"),
    }
}

pub async fn return_book(State(state): State<AppState>, Json(payload): Json<LoanRequest>) -> Response {
    match state
        .library
        .return_book(&payload.student_id, &payload.book_id, Utc::now())
        .await
    {
        Ok(returned) => success(returned),
        Err(e) => failure(e, "return book"),
    }
}

// ============================================================================
// Flag Handlers
// ============================================================================

pub async fn list_flagged(State(state): State<AppState>) -> Response {
    match state.library.flagged_students().await {
        Ok(students) => success(students),
        Err(e) => failure(e, "list flagged students"),
    }
}

pub async fn clear_flag(State(state): State<AppState>, Path(student): Path<String>) -> Response {
    match state.library.clear_flag(&student).await {
        Ok(true) => (StatusCode::NO_CONTENT, ()).into_response(),
        Ok(false) => error(StatusCode::NOT_FOUND, "Student is not flagged"),
        Err(e) => failure(e, "clear flag"),
    }
}
