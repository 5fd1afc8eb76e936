#![deny(unsafe_code)]
//! vitrine-core library.
//!
//! Record model, configuration, error codes and the SQLite catalog that acts
//! as the system of record for product data.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types where appropriate.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod error;
pub mod model;

pub use config::VitrineConfig;
pub use error::ErrorCode;
pub use model::{CategoryMeta, Record, RecordId};
