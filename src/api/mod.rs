//! JSON API over the same catalog and loan operations the form screens use.
//!
//! Every success is wrapped as `{"data": ...}` and every failure as
//! `{"error": "..."}`.

mod handler;
mod routes;

pub use routes::routes;
