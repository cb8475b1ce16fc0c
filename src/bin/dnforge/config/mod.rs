use std::fs;

use anyhow::{Context, Result};
use density_forge::{DensityModel, ModelConfig, ModelWeights, load_config};

use crate::cli::ModelOptions;
use crate::io::read_json;

pub fn build_model_config(opts: &ModelOptions) -> Result<ModelConfig> {
    let custom = match &opts.config {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read model config: {}", path.display()))?,
        ),
        None => None,
    };

    let mut config = load_config(custom.as_deref()).context("Invalid model configuration")?;
    if let Some(method) = opts.normalization {
        config.normalization = method.into();
    }
    Ok(config)
}

pub fn build_model(opts: &ModelOptions) -> Result<DensityModel> {
    let config = build_model_config(opts)?;
    let model = DensityModel::new(&config).context("Failed to build model")?;

    match &opts.weights {
        Some(path) => {
            let weights: ModelWeights = read_json(Some(path.as_path()))
                .with_context(|| format!("Failed to load weights: {}", path.display()))?;
            model
                .with_weights(weights)
                .context("Weights do not fit the configured architecture")
        }
        None => {
            tracing::warn!("no weights given; predictions come from untrained networks");
            Ok(model)
        }
    }
}
