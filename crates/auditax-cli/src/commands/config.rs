//! Config command - manage configuration.

use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;

use auditax_core::AuditConfig;

use super::input::{default_config_path, load_config};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Get a specific configuration value
    Get {
        /// Configuration key (e.g., "reconcile.mva_tolerance")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: ConfigArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let path = config_path.map(PathBuf::from).unwrap_or_else(default_config_path);
    match args.command {
        ConfigCommand::Show => show_config(config_path),
        ConfigCommand::Init(init_args) => init_config(init_args, path),
        ConfigCommand::Get { key } => get_config(config_path, &key),
        ConfigCommand::Set { key, value } => set_config(path, &key, &value),
        ConfigCommand::Path => show_path(path),
    }
}

fn show_config(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn init_config(args: InitArgs, default_path: PathBuf) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or(default_path);

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    // Create parent directory if needed
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    AuditConfig::default().save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );

    Ok(())
}

fn get_config(config_path: Option<&str>, key: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let json = serde_json::to_value(&config)?;

    let mut current = &json;
    for part in key.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    }

    println!("{}", serde_json::to_string_pretty(current)?);

    Ok(())
}

fn set_config(config_path: PathBuf, key: &str, value: &str) -> anyhow::Result<()> {
    let config = if config_path.exists() {
        AuditConfig::from_file(&config_path)?
    } else {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        AuditConfig::default()
    };

    let parsed_value: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    let mut json = serde_json::to_value(&config)?;
    let parts: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        anyhow::bail!("Empty configuration key");
    };

    let mut current = &mut json;
    for part in parents {
        current = current
            .get_mut(*part)
            .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
    }
    let Some(obj) = current.as_object_mut() else {
        anyhow::bail!("Cannot set value at non-object path");
    };
    // Decimal settings are stored as strings to keep their exact digits
    let stored = match (obj.get(*last), &parsed_value) {
        (Some(serde_json::Value::String(_)), serde_json::Value::Number(_)) => {
            serde_json::Value::String(value.to_string())
        }
        _ => parsed_value.clone(),
    };
    obj.insert((*last).to_string(), stored);

    let config: AuditConfig = serde_json::from_value(json)?;
    config.save(&config_path)?;

    println!(
        "{} Set {} = {}",
        style("✓").green(),
        key,
        serde_json::to_string(&parsed_value)?
    );

    Ok(())
}

fn show_path(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Configuration file: {}", config_path.display());

    if config_path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'auditax config init' to create a configuration file.");
    }

    Ok(())
}
