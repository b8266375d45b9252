use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::direct::DOI_RESOLVER_BASE;
use crate::error::HarvestError;
use crate::external_tool::ToolCommand;

pub const CONFIG_FILE: &str = "doi-harvest.json";
pub const DEFAULT_SAVE_DIR: &str = "Original Research Papers";
pub const DEFAULT_DOI_COLUMN: &str = "DO";
pub const DEFAULT_STATUS_COLUMN: &str = "Download_Status";
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    #[serde(default)]
    pub doi_column: Option<String>,
    #[serde(default)]
    pub status_column: Option<String>,
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub external_tool: Option<ExternalToolEntry>,
    #[serde(default)]
    pub direct: Option<DirectEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ExternalToolEntry {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub program: Option<PathBuf>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DirectEntry {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub resolver_base: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExternalToolSettings {
    pub enabled: bool,
    pub command: ToolCommand,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectSettings {
    pub enabled: bool,
    pub resolver_base: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub save_dir: PathBuf,
    pub doi_column: String,
    pub status_column: String,
    pub jobs: usize,
    pub external_tool: ExternalToolSettings,
    pub direct: DirectSettings,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from(DEFAULT_SAVE_DIR),
            doi_column: DEFAULT_DOI_COLUMN.to_string(),
            status_column: DEFAULT_STATUS_COLUMN.to_string(),
            jobs: 1,
            external_tool: ExternalToolSettings {
                enabled: true,
                command: ToolCommand::pypaperbot(),
                timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            },
            direct: DirectSettings {
                enabled: true,
                resolver_base: DOI_RESOLVER_BASE.to_string(),
                timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
                user_agent: None,
            },
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `doi-harvest.json` in the current directory when it
    /// exists. With neither, the built-in defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let defaults = ResolvedConfig::default();

        let jobs = config.jobs.unwrap_or(defaults.jobs);
        if jobs == 0 {
            return Err(HarvestError::ConfigValue(
                "jobs must be at least 1".to_string(),
            ));
        }

        let tool = config.external_tool.unwrap_or_default();
        let mut command = defaults.external_tool.command;
        if let Some(program) = tool.program {
            command.program = program;
        }
        if let Some(args) = tool.args {
            command.args = args;
        }
        let external_tool = ExternalToolSettings {
            enabled: tool.enabled.unwrap_or(true),
            command,
            timeout: positive_secs(
                "external_tool.timeout_secs",
                tool.timeout_secs,
                defaults.external_tool.timeout,
            )?,
        };

        let direct_entry = config.direct.unwrap_or_default();
        let direct = DirectSettings {
            enabled: direct_entry.enabled.unwrap_or(true),
            resolver_base: direct_entry
                .resolver_base
                .unwrap_or(defaults.direct.resolver_base),
            timeout: positive_secs(
                "direct.timeout_secs",
                direct_entry.timeout_secs,
                defaults.direct.timeout,
            )?,
            user_agent: direct_entry.user_agent,
        };

        Ok(ResolvedConfig {
            save_dir: config.save_dir.unwrap_or(defaults.save_dir),
            doi_column: config.doi_column.unwrap_or(defaults.doi_column),
            status_column: config.status_column.unwrap_or(defaults.status_column),
            jobs,
            external_tool,
            direct,
        })
    }
}

fn positive_secs(
    field: &str,
    value: Option<u64>,
    default: Duration,
) -> Result<Duration, HarvestError> {
    match value {
        None => Ok(default),
        Some(0) => Err(HarvestError::ConfigValue(format!(
            "{field} must be greater than zero"
        ))),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.save_dir, PathBuf::from(DEFAULT_SAVE_DIR));
        assert_eq!(resolved.doi_column, "DO");
        assert_eq!(resolved.status_column, "Download_Status");
        assert_eq!(resolved.jobs, 1);
        assert!(resolved.external_tool.enabled);
        assert_eq!(resolved.external_tool.timeout, Duration::from_secs(60));
        assert_eq!(resolved.direct.resolver_base, "https://doi.org");
    }

    #[test]
    fn zero_jobs_rejected() {
        let config = Config {
            jobs: Some(0),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, HarvestError::ConfigValue(_));
    }
}
