use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lendingdesk")]
#[command(about = "Runs the lendingdesk library lending service", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lendingdesk")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Sql,
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_database")]
    database: String,
}

fn default_port() -> u16 {
    8080
}

fn default_database() -> String {
    "lendingdesk.db".to_string()
}

impl Default for App {
    fn default() -> Self {
        App {
            port: default_port(),
            backend: Backend::default(),
            database: default_database(),
        }
    }
}

impl App {
    pub fn get_db(&self) -> &str {
        &self.database
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }
}

/// Lending rules. Every field falls back to the long-standing desk policy.
#[derive(Debug, Deserialize, Clone)]
pub struct Lending {
    #[serde(default = "default_max_loans")]
    pub max_loans: usize,
    #[serde(default = "default_late_after_days")]
    pub late_after_days: i64,
    #[serde(default = "default_copies")]
    pub default_copies: u32,
    #[serde(default = "default_genres")]
    pub genres: Vec<String>,
    #[serde(default)]
    pub allow_flag_clearing: bool,
}

fn default_max_loans() -> usize {
    3
}

fn default_late_after_days() -> i64 {
    7
}

fn default_copies() -> u32 {
    3
}

fn default_genres() -> Vec<String> {
    vec!["Romantic".to_string(), "Comedy".to_string(), "Scientific".to_string()]
}

impl Default for Lending {
    fn default() -> Self {
        Lending {
            max_loans: default_max_loans(),
            late_after_days: default_late_after_days(),
            default_copies: default_copies(),
            genres: default_genres(),
            allow_flag_clearing: false,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub lending: Lending,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        if config.lending.max_loans == 0 {
            anyhow::bail!("lending.max_loans must be at least 1");
        }
        if config.lending.genres.is_empty() {
            anyhow::bail!("lending.genres must list at least one genre");
        }
        Ok(config)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!("environment variable '{}' not found", var_name);
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let cfg = Config::from_yaml("{}").unwrap();
        assert_eq!(cfg.app.get_port(), 8080);
        assert_eq!(cfg.app.backend, Backend::Memory);
        assert_eq!(cfg.lending.max_loans, 3);
        assert_eq!(cfg.lending.late_after_days, 7);
        assert_eq!(cfg.lending.default_copies, 3);
        assert_eq!(cfg.lending.genres, vec!["Romantic", "Comedy", "Scientific"]);
        assert!(!cfg.lending.allow_flag_clearing);
    }

    #[test]
    fn test_sql_backend_and_policy() {
        let yaml = r#"
app:
  port: 9000
  backend: sql
  database: desk.db
lending:
  max_loans: 5
  allow_flag_clearing: true
"#;
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.app.get_port(), 9000);
        assert_eq!(cfg.app.backend, Backend::Sql);
        assert_eq!(cfg.app.get_db(), "desk.db");
        assert_eq!(cfg.lending.max_loans, 5);
        assert_eq!(cfg.lending.late_after_days, 7);
        assert!(cfg.lending.allow_flag_clearing);
    }

    #[test]
    fn test_env_default_substitution() {
        let yaml = "app:\n  database: ${LENDINGDESK_TEST_UNSET_VAR:-fallback.db}\n";
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.app.get_db(), "fallback.db");
    }

    #[test]
    fn test_rejects_zero_loan_limit() {
        assert!(Config::from_yaml("lending:\n  max_loans: 0\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "app:\n  port: 7070\n").unwrap();

        let cfg = Config::new(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.app.get_port(), 7070);
        assert_eq!(cfg.app.backend, Backend::Memory);
    }
}
