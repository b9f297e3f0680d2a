//! CLI commands

pub mod inspect;
pub mod track;

use hubtrack_tracker::TrackerConfig;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Load the configuration file given on the command line, or the default one
pub fn load_config(path: Option<&Path>) -> Result<TrackerConfig> {
    let config = match path {
        Some(path) => TrackerConfig::load_from(path)?,
        None => TrackerConfig::load()?,
    };
    Ok(config)
}

/// Cancellation token triggered by Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
    cancel
}
