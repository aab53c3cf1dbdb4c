use std::{
    fmt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    str::FromStr,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SCHEME_QUERY: &str = r#"
import json, sys, sysconfig
base = sys.argv[1]
names = sysconfig.get_scheme_names()
if 'deb_system' in names:
    scheme = 'posix_prefix'
elif hasattr(sysconfig, 'get_default_scheme'):
    scheme = sysconfig.get_default_scheme()
else:
    scheme = sysconfig._get_default_scheme()
config = {
    'base': base,
    'platbase': base,
    'installed_base': base,
    'installed_platbase': base,
}
paths = {
    key: sysconfig.get_path(key, scheme, config)
    for key in ('purelib', 'platlib', 'scripts', 'data', 'include')
}
paths['python'] = sys.executable
json.dump(paths, sys.stdout)
"#;

/// Installation categories a wheel can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKey {
    Purelib,
    Platlib,
    Scripts,
    Data,
    Headers,
}

impl SchemeKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purelib => "purelib",
            Self::Platlib => "platlib",
            Self::Scripts => "scripts",
            Self::Data => "data",
            Self::Headers => "headers",
        }
    }
}

impl fmt::Display for SchemeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemeKey {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "purelib" => Ok(Self::Purelib),
            "platlib" => Ok(Self::Platlib),
            "scripts" => Ok(Self::Scripts),
            "data" => Ok(Self::Data),
            "headers" => Ok(Self::Headers),
            other => bail!("unknown installation scheme key '{other}'"),
        }
    }
}

/// Absolute installation directories derived from an install base.
///
/// Recomputed for every install or removal; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationLayout {
    pub base: PathBuf,
    pub purelib: PathBuf,
    pub platlib: PathBuf,
    pub scripts: PathBuf,
    pub data: PathBuf,
    pub include: PathBuf,
    /// Interpreter written into launcher shebangs, when known.
    #[serde(default)]
    pub python: Option<PathBuf>,
}

#[derive(Deserialize)]
struct SchemeQueryOutput {
    purelib: PathBuf,
    platlib: PathBuf,
    scripts: PathBuf,
    data: PathBuf,
    include: PathBuf,
    python: Option<PathBuf>,
}

impl InstallationLayout {
    /// Static scheme for the running platform: `posix_prefix` on Unix, `nt` on Windows.
    pub fn for_platform(base: &Path, python_version: &str) -> Self {
        if cfg!(windows) {
            Self::nt(base)
        } else {
            Self::posix_prefix(base, python_version)
        }
    }

    pub fn posix_prefix(base: &Path, python_version: &str) -> Self {
        let site = base
            .join("lib")
            .join(format!("python{python_version}"))
            .join("site-packages");
        Self {
            base: base.to_path_buf(),
            purelib: site.clone(),
            platlib: site,
            scripts: base.join("bin"),
            data: base.to_path_buf(),
            include: base.join("include").join(format!("python{python_version}")),
            python: None,
        }
    }

    pub fn nt(base: &Path) -> Self {
        let site = base.join("Lib").join("site-packages");
        Self {
            base: base.to_path_buf(),
            purelib: site.clone(),
            platlib: site,
            scripts: base.join("Scripts"),
            data: base.to_path_buf(),
            include: base.join("Include"),
            python: None,
        }
    }

    /// Ask `python`'s `sysconfig` for the scheme rooted at `base`.
    pub fn from_interpreter(python: &str, base: &Path) -> Result<Self> {
        let base = std::path::absolute(base)
            .with_context(|| format!("failed to resolve {}", base.display()))?;
        let output = Command::new(python)
            .arg("-c")
            .arg(SCHEME_QUERY)
            .arg(&base)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to start {python}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("sysconfig query failed: {}", stderr.trim());
        }
        let parsed: SchemeQueryOutput = serde_json::from_slice(&output.stdout)
            .context("invalid sysconfig query output")?;
        debug!(
            base = %base.display(),
            purelib = %parsed.purelib.display(),
            scripts = %parsed.scripts.display(),
            "resolved installation scheme"
        );
        Ok(Self {
            base,
            purelib: parsed.purelib,
            platlib: parsed.platlib,
            scripts: parsed.scripts,
            data: parsed.data,
            include: parsed.include,
            python: parsed.python,
        })
    }

    #[must_use]
    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = Some(python.into());
        self
    }

    /// Directory for `key`; headers land in a per-distribution include directory.
    pub fn resolve(&self, key: SchemeKey, distribution: &str) -> PathBuf {
        match key {
            SchemeKey::Purelib => self.purelib.clone(),
            SchemeKey::Platlib => self.platlib.clone(),
            SchemeKey::Scripts => self.scripts.clone(),
            SchemeKey::Data => self.data.clone(),
            SchemeKey::Headers => self.include.join(distribution),
        }
    }

    /// Root library directory for a wheel.
    pub fn library_root(&self, root_is_purelib: bool) -> &Path {
        if root_is_purelib {
            &self.purelib
        } else {
            &self.platlib
        }
    }

    /// Library directories scanned for installed metadata, without duplicates.
    pub fn libdirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.purelib.clone()];
        if self.platlib != self.purelib {
            dirs.push(self.platlib.clone());
        }
        dirs
    }

    /// Interpreter for launcher shebangs.
    pub fn shebang_python(&self) -> String {
        self.python
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "/usr/bin/env python3".to_string())
    }
}
