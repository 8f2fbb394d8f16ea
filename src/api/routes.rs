use axum::{
    Router,
    routing::{delete, get, post},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/books", get(handler::list_books))
        .route("/books", post(handler::add_book))
        .route("/books/available", get(handler::list_available))
        .route("/loans", get(handler::list_loans))
        .route("/loans", post(handler::borrow))
        .route("/loans/return", post(handler::return_book))
        .route("/flagged", get(handler::list_flagged))
        .route("/flagged/:student", delete(handler::clear_flag))
}
