// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration: built-in defaults, then an optional file (YAML or
/// JSON, picked by extension), then environment variables such as
/// `WARP_COUNT` or `LB_PORT`.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config> {
    let defaults = config::Config::try_from(&Config::default())
        .context("Failed to serialize default config")?;

    let mut builder = config::Config::builder().add_source(defaults);

    if let Some(path) = path {
        let path = path.as_ref();
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: Config = builder
        .add_source(config::Environment::default().try_parsing(true))
        .build()
        .context("Failed to read config sources")?
        .try_deserialize()
        .context("Failed to parse config")?;

    config.validate()?;
    Ok(config)
}
