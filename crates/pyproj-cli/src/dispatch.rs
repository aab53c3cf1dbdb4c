use std::{
    collections::HashSet,
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};

use pyproj_core::{
    build_projects, install_archive, load_metadata, project_dependencies, uninstall,
    BuildRequest, Config, DecoratorRegistry, ExecutionOutcome, HookCaller, HookError, HookSession,
    InstallRequest, KNOWN_HOOKS,
};
use pyproj_wheel::WheelError;
use serde_json::{json, Value};
use tokio::task;

use crate::cli::{BuildArgs, CommandCli, InstallArgs, ProjectArgs, UninstallArgs};

pub async fn execute(config: Config, command: &CommandCli) -> ExecutionOutcome {
    let session = Arc::new(HookSession::new(config, DecoratorRegistry::builtin()));
    match command {
        CommandCli::Build(args) => build(session, args).await,
        CommandCli::Install(args) => install(&session, args).await,
        CommandCli::Uninstall(args) => remove(&session, args).await,
        CommandCli::Hooks(args) => hooks(&session, args).await,
        CommandCli::Requires(args) => requires(&session, args).await,
        CommandCli::Metadata(args) => metadata(&session, args).await,
    }
}

async fn build(session: Arc<HookSession>, args: &BuildArgs) -> ExecutionOutcome {
    let mut projects = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        match path.canonicalize() {
            Ok(dir) if dir.is_dir() => {
                if !projects.contains(&dir) {
                    projects.push(dir);
                }
            }
            _ => return missing_project(path),
        }
    }
    let requests = scratch_dirs(&args.build_base, &projects)
        .into_iter()
        .zip(projects)
        .map(|(build_base, project_dir)| BuildRequest {
            project_dir,
            build_base,
            install_base: args.install_base.clone(),
            editable: args.editable,
        })
        .collect();
    build_projects(session, requests).await
}

/// One scratch directory per project below `build_base`, named after the
/// project directory. Later projects sharing a name get a numeric suffix.
fn scratch_dirs(build_base: &Path, projects: &[PathBuf]) -> Vec<PathBuf> {
    let mut used: HashSet<OsString> = HashSet::new();
    projects
        .iter()
        .map(|dir| {
            let name = dir
                .file_name()
                .map_or_else(|| OsString::from("project"), ToOwned::to_owned);
            let mut unique = name.clone();
            let mut suffix = 1;
            while used.contains(&unique) {
                suffix += 1;
                unique = name.clone();
                unique.push(format!("-{suffix}"));
            }
            used.insert(unique.clone());
            build_base.join(unique)
        })
        .collect()
}

async fn install(session: &HookSession, args: &InstallArgs) -> ExecutionOutcome {
    if !args.wheel.is_file() {
        return ExecutionOutcome::user_error(
            format!("wheel not found: {}", args.wheel.display()),
            json!({ "wheel": args.wheel }),
        );
    }
    let request = InstallRequest {
        wheel: args.wheel.clone(),
        install_base: args.install_base.clone(),
        script_dir_override: args.script_dir.clone(),
        editable_source: args.editable_source.clone(),
    };
    let config = session.config().clone();
    let joined = task::spawn_blocking(move || install_archive(&config, &request)).await;
    match joined {
        Ok(Ok(installed)) => ExecutionOutcome::success(
            format!(
                "installed {} {}",
                installed.metadata.distribution, installed.metadata.version
            ),
            json!({
                "dist_info": installed.dist_info,
                "library_root": installed.library_root,
                "scripts": installed.scripts,
                "warnings": installed.warnings,
            }),
        ),
        Ok(Err(err)) => install_failure(&err),
        Err(err) => ExecutionOutcome::failure(format!("install task failed: {err}"), Value::Null),
    }
}

fn install_failure(err: &anyhow::Error) -> ExecutionOutcome {
    let details = json!({ "reason": format!("{err:#}") });
    match err.downcast_ref::<WheelError>() {
        Some(
            WheelError::InvalidFilename(_)
            | WheelError::UnsupportedVersion(_)
            | WheelError::MissingMember(_)
            | WheelError::UnknownCategory { .. }
            | WheelError::UnsafePath(_),
        ) => ExecutionOutcome::user_error(format!("{err:#}"), details),
        _ => ExecutionOutcome::failure(format!("{err:#}"), details),
    }
}

async fn remove(session: &HookSession, args: &UninstallArgs) -> ExecutionOutcome {
    let config = session.config().clone();
    let name = args.name.clone();
    let base = args.install_base.clone();
    let joined = task::spawn_blocking(move || uninstall(&config, &name, &base)).await;
    match joined {
        Ok(Ok(report)) if report.is_empty() => ExecutionOutcome::success(
            format!("{} is not installed", args.name),
            json!({ "removed": false }),
        ),
        Ok(Ok(report)) => ExecutionOutcome::success(
            format!("removed {}", args.name),
            json!({
                "removed": true,
                "distributions": report.distributions,
                "files": report.removed_files,
                "directories": report.removed_dirs,
                "egg_links": report.egg_links,
            }),
        ),
        Ok(Err(err)) => ExecutionOutcome::failure(format!("{err:#}"), Value::Null),
        Err(err) => ExecutionOutcome::failure(format!("uninstall task failed: {err}"), Value::Null),
    }
}

async fn hooks(session: &HookSession, args: &ProjectArgs) -> ExecutionOutcome {
    if !args.path.is_dir() {
        return missing_project(&args.path);
    }
    let listed = async {
        let project = session.project(&args.path)?;
        let caller = session.caller_for(&project).await?;
        let hooks = caller.list_hooks().await?;
        anyhow::Ok((caller.backend_name().to_string(), hooks))
    }
    .await;
    match listed {
        Ok((backend, hooks)) => {
            let standard: Vec<&str> = hooks
                .iter()
                .map(String::as_str)
                .filter(|hook| KNOWN_HOOKS.contains(hook))
                .collect();
            ExecutionOutcome::success(
                format!("{backend} exposes {} callables", hooks.len()),
                json!({ "backend": backend, "hooks": hooks, "standard": standard }),
            )
        }
        Err(err) => hook_failure(&args.path, &err),
    }
}

async fn requires(session: &HookSession, args: &ProjectArgs) -> ExecutionOutcome {
    if !args.path.is_dir() {
        return missing_project(&args.path);
    }
    match project_dependencies(session, &args.path).await {
        Ok(deps) => ExecutionOutcome::success(
            format!(
                "{} requires {} build, {} run and {} test dependencies",
                deps.name.as_deref().unwrap_or("project"),
                deps.build.len(),
                deps.run.len(),
                deps.test.len()
            ),
            serde_json::to_value(&deps).unwrap_or(Value::Null),
        ),
        Err(err) => hook_failure(&args.path, &err),
    }
}

async fn metadata(session: &HookSession, args: &ProjectArgs) -> ExecutionOutcome {
    if !args.path.is_dir() {
        return missing_project(&args.path);
    }
    let loaded = async {
        let project = session.project(&args.path)?;
        let caller = session.caller_for(&project).await?;
        load_metadata(caller.as_ref()).await
    }
    .await;
    match loaded {
        Ok(metadata) => ExecutionOutcome::success(
            format!(
                "{} {}",
                metadata.name().unwrap_or("unknown"),
                metadata.version().unwrap_or("unknown")
            ),
            json!({
                "name": metadata.name(),
                "version": metadata.version(),
                "requires_dist": metadata.requires_dist(),
                "maintainers": metadata.maintainers(),
            }),
        ),
        Err(err) => hook_failure(&args.path, &err),
    }
}

fn missing_project(path: &Path) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        format!("project directory not found: {}", path.display()),
        json!({ "path": path }),
    )
}

fn hook_failure(project: &Path, err: &anyhow::Error) -> ExecutionOutcome {
    match err.downcast_ref::<HookError>() {
        Some(hook_err) => ExecutionOutcome::failure(
            format!("{}: {}", project.display(), hook_err.diagnostic()),
            json!({ "code": hook_err.exit_code() }),
        ),
        None => ExecutionOutcome::failure(format!("{}: {err:#}", project.display()), Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_named_projects_get_distinct_scratch_dirs() {
        let projects = vec![
            PathBuf::from("/src/a/pkg"),
            PathBuf::from("/src/b/pkg"),
            PathBuf::from("/src/tool"),
            PathBuf::from("/src/c/pkg"),
            PathBuf::from("/src/pkg-2"),
        ];
        let dirs = scratch_dirs(Path::new("build"), &projects);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("build/pkg"),
                PathBuf::from("build/pkg-2"),
                PathBuf::from("build/tool"),
                PathBuf::from("build/pkg-3"),
                PathBuf::from("build/pkg-2-2"),
            ]
        );
    }
}
