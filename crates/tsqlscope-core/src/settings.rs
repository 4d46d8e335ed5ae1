//! Run-level analysis settings

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What to do when one scope registers the same alias twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateAliasPolicy {
    /// Keep the first registration; later ones are reported and ignored
    #[default]
    KeepFirst,
    /// Replace the earlier registration
    KeepLast,
}

impl FromStr for DuplicateAliasPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep-first" | "first" => Ok(DuplicateAliasPolicy::KeepFirst),
            "keep-last" | "last" => Ok(DuplicateAliasPolicy::KeepLast),
            _ => Err(format!(
                "Unknown duplicate alias policy: '{}'. Supported policies: keep-first, keep-last.",
                s
            )),
        }
    }
}

impl std::fmt::Display for DuplicateAliasPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateAliasPolicy::KeepFirst => write!(f, "keep-first"),
            DuplicateAliasPolicy::KeepLast => write!(f, "keep-last"),
        }
    }
}

/// Settings shared by every script of one analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Schema assumed for one-part object names
    pub default_schema: String,
    /// Database assumed before any `USE`
    pub default_database: String,
    /// Leading character of temp table names
    pub temp_table_marker: char,
    pub duplicate_alias: DuplicateAliasPolicy,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            default_schema: "dbo".to_string(),
            default_database: "master".to_string(),
            temp_table_marker: '#',
            duplicate_alias: DuplicateAliasPolicy::KeepFirst,
        }
    }
}

impl AnalysisSettings {
    pub fn is_temp_table(&self, name: &str) -> bool {
        name.starts_with(self.temp_table_marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "keep-last".parse::<DuplicateAliasPolicy>(),
            Ok(DuplicateAliasPolicy::KeepLast)
        );
        assert_eq!("First".parse(), Ok(DuplicateAliasPolicy::KeepFirst));
        assert!("random".parse::<DuplicateAliasPolicy>().is_err());
    }

    #[test]
    fn test_temp_table_marker() {
        let settings = AnalysisSettings::default();
        assert!(settings.is_temp_table("#recent"));
        assert!(!settings.is_temp_table("recent"));
    }
}
