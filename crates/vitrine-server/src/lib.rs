#![forbid(unsafe_code)]
//! vitrine-server: the HTTP surface of the hybrid search pipeline.
//!
//! - `POST /search` (and `/search/`): multipart form with `text_query`,
//!   `image_query` (file) and `top_k`
//! - `GET /health`: liveness
//!
//! The blocking search pipeline runs on tokio's blocking pool.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ServerError, ServerResult};
pub use server::{build_router, serve, serve_on};
pub use state::AppState;
