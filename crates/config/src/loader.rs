use std::{collections::HashSet, path::Path};

use anyhow::bail;
use indoc::indoc;

use crate::{Config, Error};

/// Read, parse, and validate the gateway configuration file.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(Error::ConfigOpen)?;
    let config: Config = serde_yaml::from_str(&content).map_err(Error::ConfigParse)?;

    validate(&config)?;

    Ok(config)
}

/// Construction-time validation: the issues the specification says must be
/// caught before the registry is ever built (§4.5, §9 "Config errors vs runtime errors").
pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    if config.providers.is_empty() {
        bail!(indoc! {r#"
            No providers configured. The gateway requires at least one CLI provider to function.

            Example configuration:

              providers:
                - id: example
                  type: cli
                  models:
                    - id: example-model
                  responseCommand:
                    executable: /usr/local/bin/example-cli
                    output: text
        "#});
    }

    let mut provider_ids = HashSet::new();
    let mut model_ids = HashSet::new();

    for provider in &config.providers {
        if !provider_ids.insert(provider.id.as_str()) {
            return Err(Error::Invalid(format!("duplicate provider id: {}", provider.id)).into());
        }

        if provider.models.is_empty() {
            return Err(Error::Invalid(format!("provider '{}' declares no models", provider.id)).into());
        }

        for model in &provider.models {
            if !model_ids.insert(model.id.as_str()) {
                return Err(Error::Invalid(format!("duplicate model id: {}", model.id)).into());
            }
        }
    }

    Ok(())
}
