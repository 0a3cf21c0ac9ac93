//! Configuration management for pipewright
//!
//! Built-in defaults overridden by an optional `.pipewright/config.toml`
//! discovered by walking up from the working directory, stopping at
//! repository root markers. Sections: `[worker]` (command argv and timeout),
//! `[retry]` (attempt budget), `[escalation]` (default decision mode).

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, PipewrightError};

/// Worker invocation timeout with enforced minimum.
///
/// Prevents a mistyped `timeout_secs` from producing invocations that die
/// before the worker can respond.
#[derive(Debug, Clone, Copy)]
pub struct WorkerTimeout {
    /// Timeout duration for one worker invocation
    pub duration: Duration,
}

impl WorkerTimeout {
    /// Default timeout in seconds (10 minutes)
    pub const DEFAULT_SECS: u64 = 600;

    /// Minimum timeout in seconds
    pub const MIN_SECS: u64 = 5;

    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs.max(Self::MIN_SECS)),
        }
    }
}

impl Default for WorkerTimeout {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_SECS)
    }
}

/// What to do when a phase exhausts its retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationMode {
    /// Ask on the terminal (interactive runs)
    Prompt,
    /// Always grant one more retry cycle
    Retry,
    /// Always skip the phase
    Skip,
    /// Always halt the run
    Abort,
}

impl EscalationMode {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Some(Self::Prompt),
            "retry" => Some(Self::Retry),
            "skip" => Some(Self::Skip),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Abort => "abort",
        }
    }
}

/// Where a resolved configuration value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// Built-in default
    #[default]
    Default,
    /// `.pipewright/config.toml`
    File,
    /// Command-line flag
    Cli,
}

impl ConfigSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::File => "file",
            Self::Cli => "cli",
        }
    }
}

/// Per-key provenance, surfaced in verbose diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigSources {
    pub worker_command: ConfigSource,
    pub worker_timeout: ConfigSource,
    pub max_attempts: ConfigSource,
    pub escalation: ConfigSource,
}

/// Resolved configuration: defaults merged with the discovered file
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker command argv; the materialized prompt is piped to stdin
    pub worker_command: Vec<String>,
    /// Per-invocation timeout
    pub worker_timeout: WorkerTimeout,
    /// Retry budget per escalation cycle
    pub max_attempts: u32,
    /// Default decision mode when a phase escalates
    pub escalation: EscalationMode,
    /// Which layer supplied each key
    pub sources: ConfigSources,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_command: vec!["claude".to_string(), "-p".to_string()],
            worker_timeout: WorkerTimeout::default(),
            max_attempts: 3,
            escalation: EscalationMode::Prompt,
            sources: ConfigSources::default(),
        }
    }
}

/// On-disk shape of `.pipewright/config.toml`; every key optional
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    worker: Option<WorkerSection>,
    retry: Option<RetrySection>,
    escalation: Option<EscalationSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WorkerSection {
    command: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RetrySection {
    max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EscalationSection {
    default: Option<String>,
}

impl Config {
    /// Discover and load configuration starting from the current directory
    pub fn discover() -> Result<Self, PipewrightError> {
        let cwd = std::env::current_dir().map_err(PipewrightError::Io)?;
        let start = Utf8PathBuf::from_path_buf(cwd).map_err(|p| {
            PipewrightError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("current directory is not UTF-8: {}", p.display()),
            ))
        })?;
        Ok(Self::discover_from(&start)?)
    }

    /// Path-driven discovery variant, used by tests to avoid process-global
    /// state. Falls back to defaults when no file is found.
    pub fn discover_from(start_dir: &Utf8Path) -> Result<Self, ConfigError> {
        match Self::find_config_file(start_dir) {
            Some(path) => {
                debug!(path = %path, "loading configuration file");
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Walk up from `start_dir` looking for `.pipewright/config.toml`,
    /// stopping at repository root markers (.git, .hg, .svn) or the
    /// filesystem root.
    #[must_use]
    pub fn find_config_file(start_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = start_dir.to_path_buf();
        loop {
            let candidate = current.join(".pipewright").join("config.toml");
            if candidate.as_std_path().exists() {
                return Some(candidate);
            }
            // Stop at repository root if no config found
            if current.join(".git").as_std_path().exists()
                || current.join(".hg").as_std_path().exists()
                || current.join(".svn").as_std_path().exists()
            {
                return None;
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return None,
            }
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path.as_std_path()).map_err(|e| ConfigError::InvalidFile {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_toml_str(path.as_str(), &text)
    }

    /// Parse configuration from TOML text. `path_label` is used only in
    /// error messages.
    pub fn from_toml_str(path_label: &str, text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::InvalidFile {
            path: path_label.to_string(),
            reason: e.to_string(),
        })?;
        let mut config = Self::default();
        config.apply(file)?;
        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(worker) = file.worker {
            if let Some(command) = worker.command {
                if command.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "worker.command".to_string(),
                        value: "[]".to_string(),
                    });
                }
                self.worker_command = command;
                self.sources.worker_command = ConfigSource::File;
            }
            if let Some(secs) = worker.timeout_secs {
                self.worker_timeout = WorkerTimeout::from_secs(secs);
                self.sources.worker_timeout = ConfigSource::File;
            }
        }
        if let Some(retry) = file.retry
            && let Some(max_attempts) = retry.max_attempts
        {
            if max_attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "retry.max_attempts".to_string(),
                    value: "0".to_string(),
                });
            }
            self.max_attempts = max_attempts;
            self.sources.max_attempts = ConfigSource::File;
        }
        if let Some(escalation) = file.escalation
            && let Some(mode) = escalation.default
        {
            self.escalation =
                EscalationMode::parse(&mode).ok_or_else(|| ConfigError::InvalidValue {
                    key: "escalation.default".to_string(),
                    value: mode,
                })?;
            self.sources.escalation = ConfigSource::File;
        }
        Ok(())
    }
}
