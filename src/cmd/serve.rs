//! Board server command: `rmw-board serve`.

use std::path::PathBuf;

use anyhow::Result;

use rmw_board::board::server::{ServerConfig, start_server};
use rmw_board::config::BoardConfig;

pub async fn cmd_serve(
    config: &BoardConfig,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
    open: bool,
) -> Result<()> {
    let server = ServerConfig {
        port: port.unwrap_or(config.server.port),
        db_path: db_path.unwrap_or_else(|| config.server.db_path.clone()),
        dev_mode: dev || config.server.dev_mode,
        feed_capacity: config.server.feed_capacity.max(1),
    };
    // No browser inside dev containers.
    start_server(server, open && !dev).await
}
