//! Configuration file handling

use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use tsqlscope_core::AnalysisSettings;

use crate::args::OutputFormat;

const CONFIG_FILE: &str = "tsqlscope.toml";

/// Configuration for tsqlscope
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Script file paths, directories or glob patterns
    #[serde(default)]
    pub files: Vec<String>,

    /// Output format (human, json, sarif)
    #[serde(default)]
    pub format: Option<String>,

    /// Issue codes or names to suppress (e.g., ["E0002", "duplicate-alias"])
    #[serde(default)]
    pub disable: Vec<String>,

    /// Run-level analysis settings, the `[analysis]` table
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&contents).wrap_err_with(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).into_diagnostic()
    }

    /// Load the given file, else the nearest tsqlscope.toml, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::find_and_load()?.unwrap_or_default()),
        }
    }

    /// Try to find and load tsqlscope.toml in current directory or parent directories
    pub fn find_and_load() -> Result<Option<Self>> {
        let mut current_dir = std::env::current_dir().into_diagnostic()?;

        loop {
            let config_path = current_dir.join(CONFIG_FILE);
            if config_path.exists() {
                tracing::debug!(path = %config_path.display(), "loading configuration");
                return Ok(Some(Self::from_file(&config_path)?));
            }

            if !current_dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Merge CLI arguments into configuration.
    /// CLI arguments take precedence over config file values.
    pub fn merge_with_args(
        mut self,
        files: &[PathBuf],
        format: Option<OutputFormat>,
        disable: &[String],
        default_schema: Option<&str>,
        default_database: Option<&str>,
    ) -> Self {
        if !files.is_empty() {
            self.files = files.iter().map(|p| p.display().to_string()).collect();
        }

        if let Some(fmt) = format {
            self.format = Some(format!("{:?}", fmt).to_lowercase());
        }

        if !disable.is_empty() {
            self.disable = disable.to_vec();
        }

        if let Some(schema) = default_schema {
            self.analysis.default_schema = schema.to_string();
        }

        if let Some(database) = default_database {
            self.analysis.default_database = database.to_string();
        }

        self
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        match &self.format {
            Some(format) => format.parse().map_err(|e: String| miette::miette!(e)),
            None => Ok(OutputFormat::default()),
        }
    }

    /// Whether issues with this code or name are suppressed
    pub fn is_disabled(&self, code: &str, name: &str) -> bool {
        self.disable
            .iter()
            .any(|d| d.eq_ignore_ascii_case(code) || d.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tsqlscope_core::DuplicateAliasPolicy;

    #[test]
    fn test_from_toml_with_analysis_table() {
        let config = Config::from_toml(
            r#"
            files = ["sql/**/*.sql"]
            disable = ["W0002"]

            [analysis]
            default_database = "Sales"
            duplicate_alias = "keep-last"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.files, vec!["sql/**/*.sql".to_string()]);
        assert_eq!(config.analysis.default_database, "Sales");
        assert_eq!(config.analysis.default_schema, "dbo");
        assert_eq!(config.analysis.duplicate_alias, DuplicateAliasPolicy::KeepLast);
        assert!(config.is_disabled("W0002", "duplicate-alias"));
    }

    #[test]
    fn test_args_override_file_values() {
        let config = Config::from_toml("format = \"json\"\nfiles = [\"a.sql\"]")
            .expect("valid config")
            .merge_with_args(
                &[PathBuf::from("b.sql")],
                Some(OutputFormat::Sarif),
                &[],
                Some("sales"),
                None,
            );

        assert_eq!(config.files, vec!["b.sql".to_string()]);
        assert_eq!(config.output_format().expect("format"), OutputFormat::Sarif);
        assert_eq!(config.analysis.default_schema, "sales");
        assert_eq!(config.analysis.default_database, "master");
    }

    #[test]
    fn test_analysis_table_survives_merge_without_overrides() {
        let config = Config::from_toml("[analysis]\ndefault_database = \"Sales\"\ndefault_schema = \"app\"")
            .expect("valid config")
            .merge_with_args(&[PathBuf::from("schema.sql")], None, &[], None, Some("Archive"));

        assert_eq!(config.files, vec!["schema.sql".to_string()]);
        assert_eq!(config.analysis.default_schema, "app");
        assert_eq!(config.analysis.default_database, "Archive");
    }

    #[test]
    fn test_load_reads_given_file() {
        let path = std::env::temp_dir().join(format!("tsqlscope-{}.toml", std::process::id()));
        std::fs::write(&path, "[analysis]\ndefault_schema = \"app\"").expect("write config");
        let config = Config::load(Some(&path));
        std::fs::remove_file(&path).expect("remove config");

        assert_eq!(config.expect("valid config").analysis.default_schema, "app");
    }

    #[test]
    fn test_unknown_format_is_an_error() {
        let config = Config::from_toml("format = \"xml\"").expect("valid config");
        assert!(config.output_format().is_err());
    }
}
