mod handler;
mod routes;

pub use routes::routes;
