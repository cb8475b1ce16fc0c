use super::config::ModelConfig;
use super::error::Error;
use std::sync::OnceLock;

const DEFAULT_MODEL_TOML: &str = include_str!("../../resources/default.model.toml");

static DEFAULT_CONFIG: OnceLock<ModelConfig> = OnceLock::new();

/// Parses a custom TOML configuration, or returns the built-in one.
///
/// Keys absent from a custom configuration take their default values. The
/// result is validated before it is returned.
pub fn load_config(custom_toml: Option<&str>) -> Result<ModelConfig, Error> {
    let config = match custom_toml {
        Some(toml) => toml::from_str(toml)?,
        None => default_config()?.clone(),
    };
    config.validate()?;
    Ok(config)
}

/// The embedded default configuration, parsed once.
pub fn default_config() -> Result<&'static ModelConfig, Error> {
    if let Some(config) = DEFAULT_CONFIG.get() {
        return Ok(config);
    }
    let parsed: ModelConfig = toml::from_str(DEFAULT_MODEL_TOML)?;
    Ok(DEFAULT_CONFIG.get_or_init(|| parsed))
}
