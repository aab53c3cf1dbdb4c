use std::io;

use thiserror::Error;

const NO_OUTPUT: &str = "(no output)";

/// Failure of one round trip through a hook subprocess.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to start {python}")]
    Spawn {
        python: String,
        #[source]
        source: io::Error,
    },
    #[error("hook `{hook}` of backend `{backend}` exited with code {code}: {}", trimmed(.stderr))]
    Failed {
        backend: String,
        hook: String,
        code: i32,
        stderr: String,
    },
    #[error("hook `{hook}` of backend `{backend}` timed out after {seconds}s")]
    Timeout {
        backend: String,
        hook: String,
        seconds: u64,
    },
    #[error("hook `{hook}` returned an unreadable result")]
    Decode {
        hook: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode arguments for hook `{hook}`")]
    Encode {
        hook: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to prepare a scratch directory for hook `{hook}`")]
    Scratch {
        hook: String,
        #[source]
        source: io::Error,
    },
    #[error("hook channel failed")]
    Channel(#[from] io::Error),
}

impl HookError {
    /// Captured diagnostic text, or `(no output)` when the child wrote nothing.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            HookError::Failed { stderr, .. } => trimmed(stderr).to_string(),
            other => other.to_string(),
        }
    }

    /// Child exit code for protocol failures; `-1` stands for a signal.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            HookError::Failed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

fn trimmed(stderr: &str) -> &str {
    let text = stderr.trim();
    if text.is_empty() {
        NO_OUTPUT
    } else {
        text
    }
}
