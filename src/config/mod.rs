// Configuration management module
// Loads, validates and persists the TOML settings file

pub mod settings;


pub use settings::{Config, ConfigError, OllamaConfig};

/// Print the effective configuration as TOML
#[inline]
pub fn show_config(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config)?;
    println!("# {}", config.config_file_path().display());
    println!("{}", rendered);
    Ok(())
}
