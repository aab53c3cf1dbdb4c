use std::collections::HashMap;
use std::env;
use std::time::Duration;

use pyproj_python::PYTHON_ENV;
use pyproj_wheel::DEFAULT_INSTALLER;
use serde::{Deserialize, Serialize};

pub const HOOK_TIMEOUT_ENV: &str = "PYPROJ_HOOK_TIMEOUT";
pub const MAX_CAPTURE_ENV: &str = "PYPROJ_MAX_CAPTURE_BYTES";
pub const INSTALLER_ENV: &str = "PYPROJ_INSTALLER";

pub(crate) const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub python: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// How hook subprocess output is surfaced while it is captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookOutput {
    /// Forward each line to `tracing::debug!`.
    #[default]
    Capture,
    /// Echo each line to the parent's stderr as well.
    Stream,
    Quiet,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) python: Option<String>,
    pub(crate) hooks: HookConfig,
    pub(crate) install: InstallConfig,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        Self {
            python: snapshot.var(PYTHON_ENV).map(ToOwned::to_owned),
            hooks: HookConfig {
                timeout: snapshot
                    .var(HOOK_TIMEOUT_ENV)
                    .and_then(|raw| raw.trim().parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
                max_capture_bytes: snapshot
                    .var(MAX_CAPTURE_ENV)
                    .and_then(|raw| raw.trim().parse::<usize>().ok())
                    .filter(|value| *value > 0)
                    .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES),
                output: HookOutput::default(),
            },
            install: InstallConfig {
                installer: snapshot
                    .var(INSTALLER_ENV)
                    .unwrap_or(DEFAULT_INSTALLER)
                    .to_string(),
            },
        }
    }

    /// Apply command-line overrides on top of the environment.
    #[must_use]
    pub fn with_options(mut self, options: &GlobalOptions) -> Self {
        if let Some(python) = &options.python {
            self.python = Some(python.clone());
        }
        if options.quiet || options.json {
            self.hooks.output = HookOutput::Quiet;
        } else if options.verbose > 0 || options.trace {
            self.hooks.output = HookOutput::Stream;
        }
        self
    }

    #[must_use]
    pub fn with_hook_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.hooks.timeout = timeout;
        self
    }

    /// Interpreter for hooks: explicit setting, else `PATH` discovery.
    pub fn python(&self) -> anyhow::Result<String> {
        match &self.python {
            Some(python) => Ok(python.clone()),
            None => pyproj_python::detect_interpreter(),
        }
    }

    #[must_use]
    pub fn hooks(&self) -> &HookConfig {
        &self.hooks
    }

    #[must_use]
    pub fn install(&self) -> &InstallConfig {
        &self.install
    }
}

#[derive(Debug, Clone)]
pub struct HookConfig {
    pub timeout: Option<Duration>,
    pub max_capture_bytes: usize,
    pub output: HookOutput,
}

#[derive(Debug, Clone)]
pub struct InstallConfig {
    pub installer: String,
}
