use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pyproj_python::InstallationLayout;
use pyproj_wheel::{
    install_wheel, remove_distributions, InstallOptions, InstalledWheel, RemovalReport,
};
use tracing::warn;

use crate::config::Config;

/// Python version assumed for the static scheme when no interpreter answers.
pub const FALLBACK_PYTHON_VERSION: &str = "3.12";

/// Installation layout rooted at `install_base` as the configured
/// interpreter sees it, or the static platform scheme when it cannot be
/// asked.
pub fn resolve_layout(config: &Config, install_base: &Path) -> InstallationLayout {
    let absolute = std::path::absolute(install_base);
    let install_base = absolute.as_deref().unwrap_or(install_base);
    let queried = config
        .python()
        .and_then(|python| InstallationLayout::from_interpreter(&python, install_base));
    match queried {
        Ok(layout) => layout,
        Err(err) => {
            warn!(
                base = %install_base.display(),
                "falling back to the python {FALLBACK_PYTHON_VERSION} scheme: {err:#}"
            );
            let layout = InstallationLayout::for_platform(install_base, FALLBACK_PYTHON_VERSION);
            match config.python() {
                Ok(python) => layout.with_python(python),
                Err(_) => layout,
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub wheel: PathBuf,
    pub install_base: PathBuf,
    pub script_dir_override: Option<PathBuf>,
    pub editable_source: Option<PathBuf>,
}

/// Install a wheel file, blocking; call from `spawn_blocking` in async code.
pub fn install_archive(config: &Config, request: &InstallRequest) -> Result<InstalledWheel> {
    let layout = resolve_layout(config, &request.install_base);
    let options = InstallOptions {
        script_dir_override: request.script_dir_override.clone(),
        editable_source: request.editable_source.clone(),
        installer: config.install().installer.clone(),
    };
    install_wheel(&request.wheel, &layout, &options)
        .with_context(|| format!("failed to install {}", request.wheel.display()))
}

/// Remove every installed distribution called `name` below `install_base`.
pub fn uninstall(config: &Config, name: &str, install_base: &Path) -> Result<RemovalReport> {
    let layout = resolve_layout(config, install_base);
    remove_distributions(name, &layout)
        .with_context(|| format!("failed to remove {name} from {}", install_base.display()))
}
