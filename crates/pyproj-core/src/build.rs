use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::json;
use tokio::task::{self, JoinSet};
use tracing::{info, warn};

use crate::{
    hooks::{HookCallerExt, HookError},
    install::{install_archive, InstallRequest},
    outcome::ExecutionOutcome,
    project::HookSession,
};

const SETUP_CFG: &str = "setup.cfg";
const WHEEL_DIR: &str = "wheel";

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project_dir: PathBuf,
    pub build_base: PathBuf,
    pub install_base: PathBuf,
    /// Install in editable mode, pointing back at the source tree.
    pub editable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub project: PathBuf,
    pub wheel: PathBuf,
    pub dist_info: PathBuf,
    pub scripts: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Build one project through its backend and install the produced wheel.
pub async fn build_project(session: &HookSession, request: &BuildRequest) -> Result<BuildReport> {
    info!("Building Python project in '{}'", request.project_dir.display());
    // Hooks run with the project as cwd, so every directory handed to them
    // or to the installer must not depend on ours.
    let build_base = absolute(&request.build_base)?;
    let install_base = absolute(&request.install_base)?;
    let script_dir_override =
        script_dir_override(&request.project_dir, &install_base, request.editable)?;

    let project = session.project(&request.project_dir)?;
    let caller = session.caller_for(&project).await?;

    let wheel_directory = build_base.join(WHEEL_DIR);
    fs::create_dir_all(&wheel_directory)
        .with_context(|| format!("failed to create {}", wheel_directory.display()))?;

    let mut warnings = Vec::new();
    let wheel_name = if request.editable {
        if caller.list_hooks().await?.iter().any(|hook| hook == "build_editable") {
            caller.build_editable(&wheel_directory, None).await?
        } else {
            let message = format!(
                "backend {} does not support editable installs; building a regular wheel",
                caller.backend_name()
            );
            warn!("{message}");
            warnings.push(message);
            caller.build_wheel(&wheel_directory, None).await?
        }
    } else {
        caller.build_wheel(&wheel_directory, None).await?
    };

    let install = InstallRequest {
        wheel: wheel_directory.join(&wheel_name),
        install_base,
        script_dir_override,
        editable_source: request.editable.then(|| project.dir().to_path_buf()),
    };
    let config = session.config().clone();
    let wheel = install.wheel.clone();
    let installed = task::spawn_blocking(move || install_archive(&config, &install))
        .await
        .map_err(|err| anyhow!("install task failed: {err}"))??;

    warnings.extend(installed.warnings);
    Ok(BuildReport {
        project: request.project_dir.clone(),
        wheel,
        dist_info: installed.dist_info,
        scripts: installed.scripts,
        warnings,
    })
}

/// Build independent projects concurrently. A failing project is reported
/// and does not stop the others.
pub async fn build_projects(
    session: Arc<HookSession>,
    requests: Vec<BuildRequest>,
) -> ExecutionOutcome {
    let total = requests.len();
    let mut tasks = JoinSet::new();
    for (index, request) in requests.into_iter().enumerate() {
        let session = Arc::clone(&session);
        tasks.spawn(async move {
            let result = build_project(&session, &request).await;
            (index, request, result)
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(err) => {
                return ExecutionOutcome::failure(
                    "build task failed",
                    json!({ "reason": err.to_string() }),
                )
            }
        }
    }
    results.sort_by_key(|(index, _, _)| *index);

    let mut built = Vec::new();
    let mut failed = Vec::new();
    for (_, request, result) in results {
        match result {
            Ok(report) => built.push(report),
            Err(err) => {
                let line = failure_line(&request.project_dir, &err);
                warn!("{line}");
                failed.push(json!({
                    "project": request.project_dir,
                    "message": line,
                    "code": err.downcast_ref::<HookError>().and_then(HookError::exit_code),
                }));
            }
        }
    }

    let details = json!({ "built": built, "failed": failed });
    if failed.is_empty() {
        ExecutionOutcome::success(format!("built {} project(s)", built.len()), details)
    } else {
        let lines: Vec<&str> = failed
            .iter()
            .filter_map(|entry| entry["message"].as_str())
            .collect();
        ExecutionOutcome::failure(lines.join("\n"), details)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("failed to resolve {}", path.display()))
}

/// `<project>: <captured stderr or (no output)>`
fn failure_line(project: &Path, err: &anyhow::Error) -> String {
    let diagnostic = match err.downcast_ref::<HookError>() {
        Some(hook_err) => hook_err.diagnostic(),
        None => format!("{err:#}"),
    };
    format!("{}: {diagnostic}", project.display())
}

/// Launcher directory requested by `setup.cfg`, resolved against the
/// install base. `$base` path parts stand for the install base itself.
fn script_dir_override(
    project_dir: &Path,
    install_base: &Path,
    editable: bool,
) -> Result<Option<PathBuf>> {
    let path = project_dir.join(SETUP_CFG);
    if !path.is_file() {
        return Ok(None);
    }
    let text =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let (section, keys) = if editable {
        ("develop", ["script-dir", "script_dir"])
    } else {
        ("install", ["install-scripts", "install_scripts"])
    };
    let value = keys
        .iter()
        .find_map(|key| setup_cfg_value(&text, section, key));
    Ok(value.map(|raw| resolve_base_parts(install_base, &raw)))
}

fn resolve_base_parts(install_base: &Path, raw: &str) -> PathBuf {
    let mut resolved = install_base.to_path_buf();
    for part in Path::new(raw).components() {
        if part.as_os_str() == "$base" {
            resolved = install_base.to_path_buf();
        } else {
            resolved.push(part);
        }
    }
    resolved
}

/// Non-empty value of `key` in `[section]` of a `setup.cfg`.
fn setup_cfg_value(text: &str, section: &str, key: &str) -> Option<String> {
    let mut current: Option<String> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            current = Some(trimmed[1..trimmed.len() - 1].trim().to_string());
            continue;
        }
        if current.as_deref() != Some(section) || line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(split) = trimmed.find(['=', ':']) else {
            continue;
        };
        let (name, value) = (&trimmed[..split], &trimmed[split + 1..]);
        if name.trim().eq_ignore_ascii_case(key) {
            let value = value.trim();
            return (!value.is_empty()).then(|| value.to_string());
        }
    }
    None
}
