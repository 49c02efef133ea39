//! Soak configuration: TOML file layered under explicit CLI flags.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_THREADS: usize = 16;
pub const DEFAULT_ITERATIONS: usize = 100_000;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// What each soak worker does per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    /// Enqueue only; the backlog should end at threads × iterations.
    Enqueue,
    /// Enqueue, reserve, update, discard, reserve, close; the queue should end empty.
    #[default]
    Cycle,
}

impl Workload {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::Cycle => "cycle",
        }
    }

    /// Queue operations performed per iteration.
    pub fn ops_per_iteration(self) -> u64 {
        match self {
            Self::Enqueue => 1,
            Self::Cycle => 6,
        }
    }
}

impl Display for Workload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SoakConfig {
    pub threads: usize,
    pub iterations: usize,
    pub workload: Workload,
    pub log_level: String,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            iterations: DEFAULT_ITERATIONS,
            workload: Workload::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Flags given on the command line; each one beats the file value.
#[derive(Debug, Clone, Default)]
pub struct SoakOverrides {
    pub threads: Option<usize>,
    pub iterations: Option<usize>,
    pub workload: Option<Workload>,
    pub log_level: Option<String>,
}

impl SoakConfig {
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Resolve the effective config: defaults, then `path` (if any), then overrides.
    pub fn load(path: Option<&Path>, overrides: &SoakOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text, path)?
            }
            None => Self::default(),
        };

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: &SoakOverrides) {
        if let Some(threads) = overrides.threads {
            self.threads = threads;
        }
        if let Some(iterations) = overrides.iterations {
            self.iterations = iterations;
        }
        if let Some(workload) = overrides.workload {
            self.workload = workload;
        }
        if let Some(level) = &overrides.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".to_string()));
        }
        if self.iterations == 0 {
            return Err(ConfigError::Invalid(
                "iterations must be at least 1".to_string(),
            ));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_config_path(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("txqueue-cli-{prefix}-{unique}"));
        fs::create_dir_all(&root).expect("temp dir should be created");
        root.join("soak.toml")
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config = SoakConfig::from_toml_str("threads = 4\n", Path::new("inline.toml"))
            .expect("config should parse");
        assert_eq!(config.threads, 4);
        assert_eq!(config.iterations, DEFAULT_ITERATIONS);
        assert_eq!(config.workload, Workload::Cycle);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = SoakConfig::from_toml_str("thread = 4\n", Path::new("inline.toml"))
            .expect_err("typo must not be ignored");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn overrides_beat_file_values() {
        let path = temp_config_path("overrides");
        fs::write(
            &path,
            "threads = 2\niterations = 50\nworkload = \"enqueue\"\nlog_level = \"info\"\n",
        )
        .expect("config should be written");

        let config = SoakConfig::load(
            Some(&path),
            &SoakOverrides {
                threads: Some(8),
                log_level: Some("debug".to_string()),
                ..SoakOverrides::default()
            },
        )
        .expect("config should load");

        assert_eq!(
            config,
            SoakConfig {
                threads: 8,
                iterations: 50,
                workload: Workload::Enqueue,
                log_level: "debug".to_string(),
            }
        );
        let _ = fs::remove_file(path);
    }

    #[test]
    fn zero_threads_is_invalid() {
        let err = SoakConfig::load(
            None,
            &SoakOverrides {
                threads: Some(0),
                ..SoakOverrides::default()
            },
        )
        .expect_err("zero threads must be rejected");
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("threads")));
    }

    #[test]
    fn missing_file_reports_path() {
        let path = temp_config_path("missing").with_file_name("absent.toml");
        let err = SoakConfig::load(Some(&path), &SoakOverrides::default())
            .expect_err("absent file must error");
        match err {
            ConfigError::Read { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("expected read error, got {other:?}"),
        }
    }
}
