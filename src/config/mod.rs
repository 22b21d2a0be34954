// Configuration management module
// TOML settings stored in the data directory plus the interactive setup flow

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, LayoutConfig, OllamaConfig, ServerConfig};

/// Resolve the data directory: an explicit override or `~/.pdf-rag`
#[inline]
pub fn resolve_data_dir(
    override_dir: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir),
        None => Config::default_dir(),
    }
}
