//! Configuration view and validation commands: `rmw-board config`.

use anyhow::Result;

use rmw_board::config::{BoardConfig, CONFIG_FILE, PROJECT_DIR};

use super::super::ConfigCommands;

pub fn cmd_config(
    project_dir: &std::path::Path,
    config: &BoardConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let config_path = project_dir.join(PROJECT_DIR).join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("RMW Board Configuration");
            println!("=======================");
            println!();
            match BoardConfig::search_paths(project_dir)
                .into_iter()
                .find(|p| p.exists())
            {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No board.toml found, using defaults"),
            }
            println!();
            println!("Effective values (with env/CLI overrides):");
            println!();
            print!("{}", toml::to_string_pretty(config)?);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("board.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            BoardConfig::default().save(&config_path)?;

            println!("Created board.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] port, db_path, dev_mode, feed_capacity");
            println!("  - [client] base_url, timeout_secs");
            println!("  - [defaults] department, requested_by");
            println!("  - [logging] format, filter, dir");
            println!();
        }
    }

    Ok(())
}
