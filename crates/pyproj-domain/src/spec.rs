use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use toml_edit::{DocumentMut, Item, TableLike, Value as TomlValue};
use tracing::debug;

pub const SPEC_NAME: &str = "pyproject.toml";

/// Backend used when a project does not declare one.
pub const DEFAULT_BUILD_BACKEND: &str = "setuptools.build_meta:__legacy__";
pub const DEFAULT_BUILD_REQUIRES: &[&str] = &["setuptools >= 40.8.0", "wheel"];

/// Importable backend identity plus the paths that must precede the
/// interpreter's own search path when importing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub backend: String,
    #[serde(default)]
    pub extra_search_paths: Vec<PathBuf>,
}

impl BackendDescriptor {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            extra_search_paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.extra_search_paths = paths;
        self
    }

    /// Module part of `module[:object]`.
    pub fn module(&self) -> &str {
        self.backend
            .split_once(':')
            .map_or(self.backend.as_str(), |(module, _)| module)
            .trim()
    }

    /// Dotted attribute path after the colon, if any.
    pub fn object(&self) -> Option<&str> {
        self.backend
            .split_once(':')
            .map(|(_, object)| object.trim())
            .filter(|object| !object.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSystem {
    pub requires: Vec<String>,
    pub backend: BackendDescriptor,
}

impl Default for BuildSystem {
    fn default() -> Self {
        Self {
            requires: DEFAULT_BUILD_REQUIRES
                .iter()
                .map(ToString::to_string)
                .collect(),
            backend: BackendDescriptor::new(DEFAULT_BUILD_BACKEND),
        }
    }
}

/// Parsed `pyproject.toml` of one project directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub build_system: BuildSystem,
    /// `[project].name`, when statically declared.
    pub name: Option<String>,
    pub version: Option<String>,
    pub dependencies: Vec<String>,
    pub test_dependencies: Vec<String>,
    /// `Name <email>` strings from `maintainers`, else `authors`.
    pub maintainers: Vec<String>,
    /// Whether a `pyproject.toml` was found at all.
    pub declared: bool,
}

/// Load the build-system declaration for the project rooted at `project_dir`.
///
/// A missing file yields the legacy setuptools defaults.
pub fn load_spec(project_dir: &Path) -> Result<ProjectSpec> {
    let path = project_dir.join(SPEC_NAME);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no pyproject.toml, using default build system");
            return Ok(ProjectSpec::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let doc: DocumentMut = contents
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(spec_from_document(&doc, project_dir))
}

fn spec_from_document(doc: &DocumentMut, project_dir: &Path) -> ProjectSpec {
    let build_system = doc
        .get("build-system")
        .and_then(Item::as_table_like)
        .map_or_else(BuildSystem::default, |table| {
            read_build_system(table, project_dir)
        });
    let project = doc.get("project").and_then(Item::as_table_like);

    let name = project
        .and_then(|table| table.get("name"))
        .and_then(Item::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string);
    let version = project
        .and_then(|table| table.get("version"))
        .and_then(Item::as_str)
        .map(ToString::to_string);
    let dependencies = project
        .and_then(|table| table.get("dependencies"))
        .map(string_list)
        .unwrap_or_default();
    let test_dependencies = project
        .and_then(|table| table.get("optional-dependencies"))
        .and_then(Item::as_table_like)
        .and_then(|groups| groups.get("test"))
        .map(string_list)
        .unwrap_or_default();
    let maintainers = project.map(read_maintainers).unwrap_or_default();

    ProjectSpec {
        build_system,
        name,
        version,
        dependencies,
        test_dependencies,
        maintainers,
        declared: true,
    }
}

fn read_build_system(table: &dyn TableLike, project_dir: &Path) -> BuildSystem {
    let requires = table.get("requires").map(string_list).unwrap_or_default();
    let backend = table
        .get("build-backend")
        .and_then(Item::as_str)
        .map(str::trim)
        .filter(|backend| !backend.is_empty())
        .unwrap_or(DEFAULT_BUILD_BACKEND);
    let search_paths = match table.get("backend-path") {
        Some(item) if item.is_str() => item.as_str().into_iter().map(str::to_string).collect(),
        Some(item) => string_list(item),
        None => Vec::new(),
    };
    let extra_search_paths = search_paths
        .iter()
        .map(|entry| {
            if entry == "." {
                project_dir.to_path_buf()
            } else {
                project_dir.join(entry)
            }
        })
        .collect();
    BuildSystem {
        requires,
        backend: BackendDescriptor::new(backend).with_search_paths(extra_search_paths),
    }
}

fn string_list(item: &Item) -> Vec<String> {
    item.as_array()
        .map(|array| {
            array
                .iter()
                .filter_map(|val| val.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn read_maintainers(project: &dyn TableLike) -> Vec<String> {
    let mut people = people_list(project.get("maintainers"));
    if people.is_empty() {
        people = people_list(project.get("authors"));
    }
    let mut out: Vec<String> = Vec::new();
    for (name, email) in people {
        let Some(email) = email.filter(|email| !email.is_empty()) else {
            continue;
        };
        let entry = match name.filter(|name| !name.is_empty()) {
            Some(name) => format!("{name} <{email}>"),
            None => email,
        };
        if !out.contains(&entry) {
            out.push(entry);
        }
    }
    out
}

fn people_list(item: Option<&Item>) -> Vec<(Option<String>, Option<String>)> {
    fn field(table: &dyn TableLike, key: &str) -> Option<String> {
        table
            .get(key)
            .and_then(Item::as_str)
            .map(ToString::to_string)
    }
    match item {
        Some(Item::Value(TomlValue::Array(array))) => array
            .iter()
            .filter_map(TomlValue::as_inline_table)
            .map(|table| (field(table, "name"), field(table, "email")))
            .collect(),
        Some(Item::ArrayOfTables(tables)) => tables
            .iter()
            .map(|table| (field(table, "name"), field(table, "email")))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_falls_back_to_legacy_setuptools() -> Result<()> {
        let temp = tempdir()?;
        let spec = load_spec(temp.path())?;
        assert!(!spec.declared);
        assert_eq!(spec.build_system.backend.backend, DEFAULT_BUILD_BACKEND);
        assert_eq!(spec.build_system.backend.module(), "setuptools.build_meta");
        assert_eq!(spec.build_system.backend.object(), Some("__legacy__"));
        assert_eq!(spec.build_system.requires.len(), 2);
        Ok(())
    }

    #[test]
    fn backend_path_resolves_against_project() -> Result<()> {
        let temp = tempdir()?;
        fs::write(
            temp.path().join(SPEC_NAME),
            r#"[build-system]
requires = ["flit_core >=3.2"]
build-backend = "backend"
backend-path = ["_build", "."]

[project]
name = "demo-pkg"
version = "0.3.0"
dependencies = ["requests>=2"]
authors = [{ name = "Ada", email = "ada@example.com" }, { name = "No Mail" }]

[project.optional-dependencies]
test = ["pytest"]
"#,
        )?;
        let spec = load_spec(temp.path())?;
        let backend = &spec.build_system.backend;
        assert_eq!(backend.module(), "backend");
        assert_eq!(backend.object(), None);
        assert_eq!(
            backend.extra_search_paths,
            vec![temp.path().join("_build"), temp.path().to_path_buf()]
        );
        assert_eq!(spec.name.as_deref(), Some("demo-pkg"));
        assert_eq!(spec.version.as_deref(), Some("0.3.0"));
        assert_eq!(spec.dependencies, vec!["requests>=2".to_string()]);
        assert_eq!(spec.test_dependencies, vec!["pytest".to_string()]);
        assert_eq!(spec.maintainers, vec!["Ada <ada@example.com>".to_string()]);
        Ok(())
    }

    #[test]
    fn build_system_without_backend_uses_default() -> Result<()> {
        let temp = tempdir()?;
        fs::write(
            temp.path().join(SPEC_NAME),
            "[build-system]\nrequires = [\"setuptools\"]\n",
        )?;
        let spec = load_spec(temp.path())?;
        assert_eq!(spec.build_system.backend.backend, DEFAULT_BUILD_BACKEND);
        assert_eq!(spec.build_system.requires, vec!["setuptools".to_string()]);
        assert!(spec.name.is_none());
        Ok(())
    }
}
