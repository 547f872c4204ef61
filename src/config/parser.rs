use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    Json,
    Json5,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .with_context(|| format!("Configuration file {} has no extension", path.display()))?;

        match extension.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "json5" | "jsonc" => Ok(ConfigFormat::Json5),
            "toml" => Ok(ConfigFormat::Toml),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            other => Err(anyhow::anyhow!("Unsupported configuration format: .{}", other)),
        }
    }
}

/// Configuration file parser
pub struct ConfigParser;

impl ConfigParser {
    /// Parse configuration from a file, format chosen by extension
    pub fn parse_file<T>(path: &Path) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        Self::parse_str(&content, format)
    }

    /// Parse configuration from a string
    pub fn parse_str<T>(content: &str, format: ConfigFormat) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        match format {
            ConfigFormat::Json => {
                serde_json::from_str(content).context("Failed to parse JSON configuration")
            }
            ConfigFormat::Json5 => {
                json5::from_str(content).context("Failed to parse JSON5 configuration")
            }
            ConfigFormat::Toml => toml::from_str(content).context("Failed to parse TOML configuration"),
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).context("Failed to parse YAML configuration")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_case::test_case;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        port: u16,
    }

    #[test_case("gateway.toml", ConfigFormat::Toml ; "toml")]
    #[test_case("gateway.json", ConfigFormat::Json ; "json")]
    #[test_case("gateway.json5", ConfigFormat::Json5 ; "json5")]
    #[test_case("gateway.YML", ConfigFormat::Yaml ; "uppercase yml")]
    fn detects_format_from_extension(file: &str, expected: ConfigFormat) {
        assert_eq!(ConfigFormat::from_path(Path::new(file)).unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(ConfigFormat::from_path(Path::new("gateway.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("gateway")).is_err());
    }

    #[test]
    fn json5_allows_comments() {
        let sample: Sample = ConfigParser::parse_str(
            "{ // kiln line 2\n name: 'kiln', port: 8080 }",
            ConfigFormat::Json5,
        )
        .unwrap();

        assert_eq!(sample, Sample { name: "kiln".to_string(), port: 8080 });
    }

    #[test]
    fn parses_yaml_file_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "name: mill\nport: 9000").unwrap();

        let sample: Sample = ConfigParser::parse_file(file.path()).unwrap();

        assert_eq!(sample, Sample { name: "mill".to_string(), port: 9000 });
    }

    #[test]
    fn reports_parse_errors_with_format() {
        let err = ConfigParser::parse_str::<Sample>("name = ", ConfigFormat::Toml).unwrap_err();

        assert!(err.to_string().contains("TOML"));
    }
}
