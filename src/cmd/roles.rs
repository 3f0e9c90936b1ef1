//! Role lookup and assignment: `rmw-board role`.

use anyhow::{Context, Result};

use rmw_board::board::roles::{Role, RoleStore};
use rmw_board::config::BoardConfig;

use super::super::RoleCommands;
use super::client;

pub async fn cmd_role(config: &BoardConfig, command: RoleCommands) -> Result<()> {
    let backend = client(config)?;

    match command {
        RoleCommands::Get { user } => {
            match backend
                .role_for(&user)
                .await
                .context("Failed to look up role")?
            {
                Some(role) => {
                    println!("User:  {}", user);
                    println!("Role:  {}", role);
                    println!("View:  {:?}", role.view());
                }
                None => println!("User '{}' has no role assigned.", user),
            }
        }
        RoleCommands::Set { user, role } => {
            backend
                .assign_role(&user, role)
                .await
                .context("Failed to assign role")?;
            println!("Assigned role {} to {}", role, user);
        }
    }
    Ok(())
}

/// Check that `user` holds a role allowed to perform `action`.
/// Without a user there is nothing to check.
pub async fn authorize(
    store: &dyn RoleStore,
    user: Option<&str>,
    allowed: fn(&Role) -> bool,
    action: &str,
) -> Result<()> {
    let Some(user) = user else {
        return Ok(());
    };
    let role = store
        .role_for(user)
        .await
        .context("Failed to look up role")?
        .with_context(|| format!("User '{}' has no role assigned", user))?;
    if !allowed(&role) {
        anyhow::bail!("Role '{}' may not {}", role, action);
    }
    tracing::debug!(%user, %role, action, "authorized");
    Ok(())
}
