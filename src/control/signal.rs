// src/control/signal.rs

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::error;

use crate::control::ControlContext;

/// Ctrl-C → graceful shutdown. Every interrupt re-issues the request, so a
/// second Ctrl-C reaches a cycle that was started in the meantime.
pub fn spawn_ctrl_c_handler(ctx: Arc<ControlContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            ctx.request_shutdown("ctrl-c");
        }
    })
}
