use crate::api::Mode;
use crate::commands::{context, Out};
use crate::{Config, Result};
use tracing::{info, warn};

/// Runs the HTTP server and the periodic tasks until the process is interrupted. The cache is
/// filled once before the server starts taking requests.
pub async fn serve(config: Config, mode: Mode) -> Result<Out<()>> {
    let ctx = context(config, mode).await?;
    match ctx.refresh_cache().await {
        Ok(rows) => info!("Cached {rows} rows"),
        Err(e) => warn!("The initial cache refresh failed, the next periodic refresh will retry: {e}"),
    }

    let tasks = ctx.spawn_tasks();
    let result = crate::server::run(ctx).await;
    for task in tasks {
        task.abort();
    }
    result?;
    Ok(Out::new_message("Server stopped"))
}
