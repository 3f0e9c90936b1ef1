//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                     |
//! |-----------------|------------------------------------------------------|
//! | `serve`         | `Serve`                                              |
//! | `requests`      | `Submit`, `List`, `Status`, `Complete`,              |
//! |                 | `BatchComplete`, `Delete`, `Reset`, `Report`         |
//! | `roles`         | `Role`                                               |
//! | `config`        | `Config`                                             |

pub mod config;
pub mod requests;
pub mod roles;
pub mod serve;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use rmw_board::board::http::HttpBackend;
use rmw_board::config::BoardConfig;

pub use config::cmd_config;
pub use requests::{
    cmd_batch_complete, cmd_complete, cmd_delete, cmd_list, cmd_report, cmd_reset, cmd_status,
    cmd_submit, submission,
};
pub use roles::cmd_role;
pub use serve::cmd_serve;

/// HTTP client for the configured board server.
pub fn client(config: &BoardConfig) -> Result<Arc<HttpBackend>> {
    let backend = HttpBackend::new(
        &config.client.base_url,
        Duration::from_secs(config.client.timeout_secs),
    )
    .context("Failed to build HTTP client")?;
    Ok(Arc::new(backend))
}
