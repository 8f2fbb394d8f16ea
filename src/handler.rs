use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
};
use serde::Serialize;
use tracing::info;

use crate::assets::serve_embedded;
use crate::error::LendingError;
use crate::library::Library;
use crate::page::{self, Notice};
use crate::store::Store;
use crate::{admin, api, student};

#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library<Store>>,
}

impl AppState {
    pub fn new(library: Library<Store>) -> Self {
        AppState {
            library: Arc::new(library),
        }
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    store: &'static str,
}

pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    info!("got healthcheck request");
    Json(Health {
        status: "ok",
        store: state.library.store().kind(),
    })
}

pub async fn index() -> Html<String> {
    let body = r#"
        <p>Select user type:</p>
        <ul>
            <li><a href="/admin">Admin</a></li>
            <li><a href="/student">Student</a></li>
        </ul>
    "#;
    page::layout("Library Management System", None, None, None, body)
}

/// Turns a rule violation into an inline warning. Store failures are logged
/// and replaced with a generic message.
pub fn notice_for(err: &LendingError, action: &str) -> Notice {
    if err.is_warning() {
        Notice::Warning(err.to_string())
    } else {
        tracing::error!(error = %crate::error::unpack_error(err), "failed to {}", action);
        Notice::Warning(format!("Failed to {}. Please try again.", action))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(healthcheck))
        .nest("/admin", admin::routes())
        .nest("/student", student::routes())
        .nest("/api", api::routes())
        .fallback(serve_embedded)
        .with_state(state)
}
