pub mod admin;
pub mod api;
pub mod assets;
pub mod config;
pub mod error;
pub mod handler;
pub mod library;
pub mod model;
pub mod page;
pub mod store;
pub mod student;

pub use handler::{AppState, router};
