//! Administrator screens: add books, browse the catalog, see who holds what
//! and who is flagged.

mod handler;
mod routes;

pub use routes::routes;
