use axum::{
    Router,
    routing::{get, post},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::home))
        .route("/borrow", get(handler::borrow_form))
        .route("/borrow", post(handler::borrow))
        .route("/return", get(handler::return_form))
        .route("/return", post(handler::return_book))
        .route("/books", get(handler::all_books))
}
