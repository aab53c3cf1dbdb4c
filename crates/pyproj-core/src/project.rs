use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};
use pyproj_domain::{classify_requirements, load_spec, CoreMetadata, ProjectSpec};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::{
    config::Config,
    decorators::DecoratorRegistry,
    hooks::{AsyncHookCaller, HookCaller, HookCallerExt, HookError},
    metadata::load_metadata,
};

const PROJECT_MARKERS: &[&str] = &["pyproject.toml", "setup.cfg", "setup.py"];

/// Lazily computed facts about one project directory.
///
/// Each value is loaded at most once, even under concurrent first access,
/// and is never refreshed afterwards.
#[derive(Debug)]
pub struct ProjectEntry {
    dir: PathBuf,
    spec: OnceCell<ProjectSpec>,
    metadata: OnceCell<CoreMetadata>,
}

impl ProjectEntry {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            spec: OnceCell::new(),
            metadata: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn spec(&self) -> Result<&ProjectSpec> {
        self.spec
            .get_or_try_init(|| async { load_spec(&self.dir) })
            .await
    }

    pub async fn metadata(&self, caller: &dyn HookCaller) -> Result<&CoreMetadata> {
        self.metadata
            .get_or_try_init(|| load_metadata(caller))
            .await
    }
}

/// Project entries keyed by canonical directory.
#[derive(Debug, Default)]
pub struct ProjectCache {
    entries: Mutex<HashMap<PathBuf, Arc<ProjectEntry>>>,
}

impl ProjectCache {
    pub fn entry(&self, dir: &Path) -> Result<Arc<ProjectEntry>> {
        let key = dir
            .canonicalize()
            .with_context(|| format!("project directory {} is not accessible", dir.display()))?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ProjectEntry::new(key)));
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Configuration, decorators and project cache shared by every hook call
/// of one run.
#[derive(Debug)]
pub struct HookSession {
    config: Config,
    registry: DecoratorRegistry,
    cache: ProjectCache,
}

impl HookSession {
    pub fn new(config: Config, registry: DecoratorRegistry) -> Self {
        Self {
            config,
            registry,
            cache: ProjectCache::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project(&self, dir: &Path) -> Result<Arc<ProjectEntry>> {
        self.cache.entry(dir)
    }

    /// Decorated hook caller for the backend `project` declares.
    pub async fn caller_for(&self, project: &ProjectEntry) -> Result<Arc<dyn HookCaller>> {
        let spec = project.spec().await?;
        if !spec.declared {
            debug!(
                project = %project.dir().display(),
                backend = %spec.build_system.backend.backend,
                "no pyproject.toml; assuming the default backend"
            );
        }
        let caller = AsyncHookCaller::from_config(
            spec.build_system.backend.clone(),
            project.dir(),
            &self.config,
        )?;
        Ok(self.registry.decorate(Arc::new(caller)))
    }
}

/// Name of the Python project in `dir`, or `None` when `dir` is not one
/// or its backend cannot report metadata.
pub async fn identify_project(session: &HookSession, dir: &Path) -> Result<Option<String>> {
    if !PROJECT_MARKERS.iter().any(|marker| dir.join(marker).is_file()) {
        return Ok(None);
    }
    let project = session.project(dir)?;
    if let Some(name) = &project.spec().await?.name {
        return Ok(Some(name.clone()));
    }

    let caller = session.caller_for(&project).await?;
    match project.metadata(caller.as_ref()).await {
        Ok(metadata) => Ok(metadata.name().map(ToOwned::to_owned)),
        Err(err) => match err.downcast_ref::<HookError>() {
            Some(hook_err) => {
                warn!(
                    "An error occurred while reading metadata for {}: {}",
                    dir.display(),
                    hook_err.diagnostic()
                );
                Ok(None)
            }
            None => Err(err),
        },
    }
}

/// Dependencies and descriptive fields of one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDependencies {
    pub name: Option<String>,
    /// `false` when no `pyproject.toml` exists and the default backend and
    /// build requirements were assumed.
    pub declared: bool,
    pub version: Option<String>,
    pub build: Vec<String>,
    pub run: Vec<String>,
    pub test: Vec<String>,
    pub maintainers: Vec<String>,
}

/// Combine static `[project]` data with what the backend reports.
///
/// Build dependencies are the declared `build-system.requires` plus the
/// result of `get_requires_for_build_wheel`. Run and test dependencies
/// come from the backend's `Requires-Dist`; static values only fill gaps.
pub async fn project_dependencies(
    session: &HookSession,
    dir: &Path,
) -> Result<ProjectDependencies> {
    let project = session.project(dir)?;
    let caller = session.caller_for(&project).await?;
    project_dependencies_with(&project, caller.as_ref()).await
}

pub(crate) async fn project_dependencies_with(
    project: &ProjectEntry,
    caller: &dyn HookCaller,
) -> Result<ProjectDependencies> {
    let spec = project.spec().await?;
    let mut deps = ProjectDependencies {
        name: spec.name.clone(),
        declared: spec.declared,
        version: spec.version.clone(),
        build: spec.build_system.requires.clone(),
        run: spec.dependencies.clone(),
        test: spec.test_dependencies.clone(),
        maintainers: spec.maintainers.clone(),
    };

    for requirement in caller.get_requires_for_build_wheel(None).await? {
        push_unique(&mut deps.build, requirement);
    }

    let metadata = project.metadata(caller).await?;
    debug!(project = %project.dir().display(), "augmenting from backend metadata");
    let sets = classify_requirements(metadata.requires_dist());
    for requirement in sets.run {
        push_unique(&mut deps.run, requirement);
    }
    for requirement in sets.test {
        push_unique(&mut deps.test, requirement);
    }
    if deps.name.is_none() {
        deps.name = metadata.name().map(ToOwned::to_owned);
    }
    if deps.version.is_none() {
        deps.version = metadata.version().map(ToOwned::to_owned);
    }
    if deps.maintainers.is_empty() {
        deps.maintainers = metadata.maintainers();
    }
    Ok(deps)
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}
