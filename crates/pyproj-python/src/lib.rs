//! Interpreter discovery and installation-scheme resolution.

mod scheme;

use std::env;

use anyhow::{anyhow, bail, Result};

pub use scheme::{InstallationLayout, SchemeKey};

/// Environment variable naming the interpreter used for hooks and scheme queries.
pub const PYTHON_ENV: &str = "PYPROJ_PYTHON";

/// Locate the Python interpreter used to run build backends.
///
/// `PYPROJ_PYTHON` wins; otherwise the first of `python3`/`python` on `PATH`.
pub fn detect_interpreter() -> Result<String> {
    if let Some(explicit) = env::var(PYTHON_ENV).ok().filter(|value| !value.trim().is_empty()) {
        return Ok(explicit);
    }

    for candidate in ["python3", "python"] {
        if let Ok(path) = which::which(candidate) {
            return path
                .into_os_string()
                .into_string()
                .map_err(|_| anyhow!("non-utf8 interpreter path"));
        }
    }

    bail!("no python interpreter found; set {PYTHON_ENV}");
}
