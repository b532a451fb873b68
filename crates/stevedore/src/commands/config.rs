//! Config command implementation

use anyhow::{Context, Result};
use std::path::Path;
use stevedore_core::HarnessConfig;
use tracing::debug;

use crate::cli::ConfigFormat;

/// Execute the config command: print the effective configuration
pub fn execute_config(config_path: Option<&Path>, format: ConfigFormat) -> Result<()> {
    let config = HarnessConfig::load(config_path).context("Failed to load configuration")?;
    debug!("Effective configuration: {:?}", config);
    println!("{}", render(&config, format)?);
    Ok(())
}

fn render(config: &HarnessConfig, format: ConfigFormat) -> Result<String> {
    let rendered = match format {
        ConfigFormat::Toml => config
            .to_toml_string()
            .context("Failed to render configuration")?
            .trim_end()
            .to_string(),
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .context("Failed to serialize configuration to JSON")?,
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_json_uses_field_names() {
        let config = HarnessConfig {
            port: Some(8080),
            ..Default::default()
        };
        let rendered = render(&config, ConfigFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["port"], 8080);
        assert_eq!(value["health_path"], "/health_check");
        assert_eq!(value["target_address"], serde_json::Value::Null);
    }

    #[test]
    fn test_render_toml_loads_back() {
        let config = HarnessConfig::default();
        let rendered = render(&config, ConfigFormat::Toml).unwrap();
        assert_eq!(HarnessConfig::from_toml_str(&rendered).unwrap(), config);
    }
}
