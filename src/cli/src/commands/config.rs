//! Engine configuration commands.
//!
//! Values live in the job store's config table and apply to subsequent
//! enqueues (e.g. `max-retries`, `backoff-base`).

use anyhow::{bail, Result};
use clap::Subcommand;

use conveyor_core::store::JobStore;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    ///
    /// Known keys: max-retries (default 3), backoff-base (default 2).
    Set {
        /// Configuration key
        key: String,
        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show all configuration values
    Show,
}

pub async fn execute(cmd: ConfigCommands, store: &JobStore, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            store.config_set(&key, &value).await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("{} = {}", key, value));
                }
                _ => output::print_item(
                    &serde_json::json!({ "key": key, "value": value }),
                    format,
                ),
            }
        }

        ConfigCommands::Get { key } => match store.config_get(&key).await? {
            Some(value) => match format {
                OutputFormat::Table => println!("{} = {}", key, value),
                _ => output::print_item(
                    &serde_json::json!({ "key": key, "value": value }),
                    format,
                ),
            },
            None => bail!("Config key '{}' not found", key),
        },

        ConfigCommands::Show => {
            let entries = store.config_all().await?;

            if entries.is_empty() {
                output::print_info("No configuration values set.");
                return Ok(());
            }

            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    for (key, value) in &entries {
                        output::print_detail(key, value);
                    }
                }
                _ => {
                    let map: std::collections::BTreeMap<_, _> = entries.into_iter().collect();
                    output::print_item(&map, format);
                }
            }
        }
    }

    Ok(())
}
