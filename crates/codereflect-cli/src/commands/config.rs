//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use codereflect_core::{Config, WriteErrorPolicy};

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "port": config.port,
                    "bind_address": config.bind_address,
                    "debounce_ms": config.debounce_ms,
                    "connect_timeout_ms": config.connect_timeout_ms,
                    "max_snapshot_bytes": config.max_snapshot_bytes,
                    "write_error_policy": config.write_error_policy,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}:{}", config.bind_address, config.port);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  port:               {}", config.port);
            println!("  bind_address:       {}", config.bind_address);
            println!("  debounce_ms:        {}", config.debounce_ms);
            println!("  connect_timeout_ms: {}", config.connect_timeout_ms);
            println!("  max_snapshot_bytes: {}", config.max_snapshot_bytes);
            println!("  write_error_policy: {}", config.write_error_policy);
            println!(
                "  log_file:           {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "port" => {
            config.port = value
                .parse()
                .context("Invalid value for port. Use a number between 0 and 65535.")?;
        }
        "bind_address" => {
            config.bind_address = value.to_string();
        }
        "debounce_ms" => {
            config.debounce_ms = value
                .parse()
                .context("Invalid value for debounce_ms. Use a number of milliseconds.")?;
        }
        "connect_timeout_ms" => {
            config.connect_timeout_ms = value
                .parse()
                .context("Invalid value for connect_timeout_ms. Use a number of milliseconds.")?;
        }
        "max_snapshot_bytes" => {
            config.max_snapshot_bytes = value
                .parse()
                .context("Invalid value for max_snapshot_bytes. Use a number of bytes.")?;
        }
        "write_error_policy" => {
            config.write_error_policy = value.parse::<WriteErrorPolicy>()?;
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: port, bind_address, debounce_ms, connect_timeout_ms, \
                 max_snapshot_bytes, write_error_policy, log_file",
                key
            );
        }
    }
    Ok(())
}
