use anyhow::{Context as _, Result};
use std::sync::Arc;
use vitrine_core::VitrineConfig;
use vitrine_server::AppState;

/// Execute `vt serve`: build every collaborator, then serve until shutdown.
///
/// # Errors
///
/// Returns an error if any collaborator fails to initialise or the server
/// cannot bind.
pub fn run_serve(config: &VitrineConfig) -> Result<()> {
    let state = Arc::new(AppState::from_config(config)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    runtime.block_on(vitrine_server::serve(state))
}
