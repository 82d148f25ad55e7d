//! Long-running producer and consumer loops

use kb_core::SnapshotMode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::Result;

/// Refresh periodically until interrupted
pub async fn run_serve(ctx: &Context) -> Result<()> {
    let service = ctx.service(SnapshotMode::Producer);
    if let Err(e) = service.start().await {
        warn!(error = %e, "initial refresh failed, retrying on the next tick");
    }
    service.serve(cancel_on_interrupt()).await?;
    Ok(())
}

/// Reload on every published change until interrupted
pub async fn run_watch(ctx: &Context) -> Result<()> {
    let service = ctx.service(SnapshotMode::Consumer);
    service.watch(cancel_on_interrupt()).await?;
    Ok(())
}

fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for interrupts"),
        }
    });
    cancel
}
