//! Configuration loading helpers
//!
//! A service configuration is read from a single file whose format is chosen
//! by extension, then overlaid with prefixed environment variables.

use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{CommonError, Result};

/// Build the file layer for `path`, dispatching on its extension
fn file_figment(path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CommonError::Config("Config file must have an extension".to_string()))?;

    if !path.exists() {
        return Err(CommonError::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let figment = match extension {
        "toml" => Figment::new().merge(Toml::file(path)),
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        "json" => Figment::new().merge(Json::file(path)),
        _ => {
            return Err(CommonError::Config(format!(
                "Unsupported config file format: {}",
                extension
            )))
        },
    };

    Ok(figment)
}

/// Load configuration from a specific file
pub fn load_config<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    file_figment(path)?
        .extract()
        .map_err(|e| CommonError::Config(format!("Failed to load configuration from file: {}", e)))
}

/// Load configuration from a file, then overlay environment variables
///
/// Variables are matched as `{prefix}{KEY}`; nested keys use `__` as the
/// separator, so `REGSRV_MQTT__HOST` overrides `mqtt.host`.
pub fn load_config_with_env<T, P>(path: P, env_prefix: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    info!(
        "Loading configuration from {} (env prefix {})",
        path.display(),
        env_prefix
    );

    file_figment(path)?
        .merge(Env::prefixed(env_prefix).split("__"))
        .extract()
        .map_err(|e| CommonError::Config(format!("Failed to load configuration: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestConfig {
        name: String,
        port: u16,
        nested: NestedConfig,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct NestedConfig {
        host: String,
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("service.yaml");
        std::fs::write(
            &path,
            "name: bridge\nport: 1883\nnested:\n  host: broker.local\n",
        )
        .unwrap();

        let config: TestConfig = load_config(&path).unwrap();
        assert_eq!(config.name, "bridge");
        assert_eq!(config.port, 1883);
        assert_eq!(config.nested.host, "broker.local");
    }

    #[test]
    fn test_load_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(
            &path,
            r#"{"name": "bridge", "port": 502, "nested": {"host": "10.0.0.2"}}"#,
        )
        .unwrap();

        let config: TestConfig = load_config(&path).unwrap();
        assert_eq!(config.port, 502);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("service.ini");
        std::fs::write(&path, "name=bridge").unwrap();

        let result: Result<TestConfig> = load_config(&path);
        assert!(matches!(result, Err(CommonError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result: Result<TestConfig> = load_config("/nonexistent/service.yaml");
        assert!(matches!(result, Err(CommonError::Config(msg)) if msg.contains("not found")));
    }

    #[test]
    fn test_env_overlay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("service.yaml");
        std::fs::write(
            &path,
            "name: bridge\nport: 1883\nnested:\n  host: broker.local\n",
        )
        .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("COMMONTEST_NESTED__HOST", "override.local");
            let config: TestConfig = load_config_with_env(&path, "COMMONTEST_")
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.nested.host, "override.local");
            assert_eq!(config.port, 1883);
            Ok(())
        });
    }
}
