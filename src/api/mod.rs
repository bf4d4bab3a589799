//! HTTP surface: bearer auth, quota routes and the axum server.

pub mod auth;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{build_router, start_server, AppState};
