use axum::{
    Router,
    routing::{get, post},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::menu))
        .route("/books", get(handler::all_books))
        .route("/books", post(handler::add_book))
        .route("/books/new", get(handler::add_book_form))
        .route("/loans", get(handler::borrowed_books))
        .route("/flagged", get(handler::flagged_students))
        .route("/flagged/clear", post(handler::clear_flag))
}
