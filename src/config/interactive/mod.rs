#[cfg(test)]
mod tests;

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, OllamaConfig, ServerConfig};
use crate::embeddings::ollama::OllamaClient;

#[inline]
pub fn run_interactive_config(data_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 PDF RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(data_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for embedding generation.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Server Configuration").bold().yellow());
    configure_server(&mut config.server)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before indexing.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!(
        "  Timeout: {}s, attempts: {}",
        style(config.ollama.timeout_seconds).cyan(),
        style(config.ollama.retry_attempts).cyan()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Layout Settings:").bold().yellow());
    eprintln!("  Image margin: {}pt", style(config.layout.margin).cyan());
    eprintln!(
        "  Horizontal weight: {}",
        style(config.layout.horizontal_weight).cyan()
    );
    eprintln!(
        "  Line tolerance: {}pt, block gap: {}pt",
        style(config.layout.line_tolerance).cyan(),
        style(config.layout.block_gap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server Settings:").bold().yellow());
    eprintln!(
        "  Listen: {}",
        style(config.server.bind_address()).cyan()
    );
    eprintln!("  Results per query: {}", style(config.server.top_k).cyan());

    eprintln!();
    eprintln!("Data directory: {}", style(config.get_base_dir().display()).dim());
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());
}

fn load_existing_config(data_dir: &Path) -> Result<Config> {
    Config::load(data_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Ok(Config::with_base_dir(data_dir))
        },
        |config| {
            eprintln!("{}", style("Loaded configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let timeout_seconds: u64 = Input::new()
        .with_prompt("Request timeout (seconds)")
        .default(ollama.timeout_seconds)
        .validate_with(|input: &u64| validate_timeout(*input))
        .interact_text()?;

    let retry_attempts: u32 = Input::new()
        .with_prompt("Embedding retry attempts")
        .default(ollama.retry_attempts)
        .validate_with(|input: &u32| validate_retry_attempts(*input))
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_timeout_seconds(timeout_seconds)?;
    ollama.set_retry_attempts(retry_attempts)?;

    Ok(())
}

fn validate_timeout(timeout_seconds: u64) -> Result<(), ConfigError> {
    OllamaConfig::default().set_timeout_seconds(timeout_seconds)
}

fn validate_retry_attempts(retry_attempts: u32) -> Result<(), ConfigError> {
    OllamaConfig::default().set_retry_attempts(retry_attempts)
}

fn configure_server(server: &mut ServerConfig) -> Result<()> {
    let port: u16 = Input::new()
        .with_prompt("HTTP server port")
        .default(server.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let top_k: usize = Input::new()
        .with_prompt("Results returned per query")
        .default(server.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Result count must be between 1 and 100")
            }
        })
        .interact_text()?;

    server.port = port;
    server.top_k = top_k;
    Ok(())
}

fn test_ollama_connection(config: &Config) -> bool {
    match OllamaClient::new(config) {
        Ok(client) => client
            .with_timeout(std::time::Duration::from_secs(5))
            .ping()
            .is_ok(),
        Err(_) => false,
    }
}
