use std::{
    collections::BTreeSet,
    fs,
    io::{BufRead, BufReader, ErrorKind},
    path::{Component, Path, PathBuf},
};

use pyproj_domain::{canonicalize_name, names_match};
use pyproj_python::InstallationLayout;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::IoContext;
use crate::{script_filenames, EntryPoints, Record, WheelError};

/// What a removal pass deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Metadata directories of the removed distributions.
    pub distributions: Vec<PathBuf>,
    pub removed_files: usize,
    pub removed_dirs: usize,
    pub egg_links: Vec<PathBuf>,
}

impl RemovalReport {
    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty() && self.egg_links.is_empty()
    }
}

/// Remove every installed distribution named `name` below `layout.base`.
///
/// Nothing matching is not an error.
pub fn remove_distributions(
    name: &str,
    layout: &InstallationLayout,
) -> Result<RemovalReport, WheelError> {
    let install_base = normalize_lexically(&layout.base);
    let mut libdirs = layout.libdirs();
    let mut egg_links = Vec::new();

    for libdir in layout.libdirs() {
        for candidate in egg_link_names(name) {
            let egg_link = libdir.join(candidate);
            match read_first_line(&egg_link) {
                Ok(link_dir) => {
                    debug!(egg_link = %egg_link.display(), target = %link_dir, "found egg-link");
                    libdirs.push(libdir.join(link_dir.trim_end()));
                    egg_links.push(egg_link);
                    break;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err).io_context("read", &egg_link),
            }
        }
    }

    let mut report = RemovalReport::default();
    for libdir in &libdirs {
        for dist in discover(name, libdir)? {
            let files = dist.files(&install_base, layout)?;
            let parents: BTreeSet<PathBuf> = files
                .iter()
                .flat_map(|file| parent_dirs(file, &install_base))
                .collect();

            for file in &files {
                debug!(path = %file.display(), "removing");
                if remove_file_if_present(file)? {
                    report.removed_files += 1;
                }
            }
            for parent in parents.iter().rev() {
                if is_empty_dir(parent) {
                    debug!(path = %parent.display(), "removing empty directory");
                    match fs::remove_dir(parent) {
                        Ok(()) => report.removed_dirs += 1,
                        Err(err) if err.kind() == ErrorKind::NotFound => {}
                        Err(err) => {
                            warn!(path = %parent.display(), error = %err, "failed to remove directory");
                        }
                    }
                }
            }
            report.distributions.push(dist.metadata_dir);
        }
    }

    egg_links.sort();
    for egg_link in &egg_links {
        debug!(path = %egg_link.display(), "removing egg-link");
        remove_file_if_present(egg_link)?;
    }
    report.egg_links = egg_links;
    Ok(report)
}

fn remove_file_if_present(path: &Path) -> Result<bool, WheelError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).io_context("remove", path),
    }
}

fn egg_link_names(name: &str) -> Vec<String> {
    let mut names = vec![format!("{}.egg-link", name.replace('_', "-"))];
    let canonical = format!("{}.egg-link", canonicalize_name(name));
    if !names.contains(&canonical) {
        names.push(canonical);
    }
    names
}

fn read_first_line(path: &Path) -> std::io::Result<String> {
    let file = fs::File::open(path)?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line)?;
    Ok(line.trim_end().to_string())
}

/// An installed `*.dist-info` or `*.egg-info` directory.
struct InstalledDistribution {
    metadata_dir: PathBuf,
    /// Directory installed paths are relative to.
    location: PathBuf,
}

fn discover(name: &str, libdir: &Path) -> Result<Vec<InstalledDistribution>, WheelError> {
    let entries = match fs::read_dir(libdir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).io_context("list", libdir),
    };
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.io_context("list", libdir)?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(stem) = file_name
            .strip_suffix(".dist-info")
            .or_else(|| file_name.strip_suffix(".egg-info"))
        else {
            continue;
        };
        let dist_name = stem.split('-').next().unwrap_or(stem);
        if names_match(dist_name, name) && entry.path().is_dir() {
            found.push(InstalledDistribution {
                metadata_dir: entry.path(),
                location: libdir.to_path_buf(),
            });
        }
    }
    found.sort_by(|a, b| a.metadata_dir.cmp(&b.metadata_dir));
    Ok(found)
}

impl InstalledDistribution {
    fn read_optional(&self, file: &str) -> Result<Option<String>, WheelError> {
        let path = self.metadata_dir.join(file);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).io_context("read", &path),
        }
    }

    /// Installed paths as listed by `RECORD`, or `installed-files.txt` for eggs.
    fn listed_files(&self) -> Result<Vec<PathBuf>, WheelError> {
        if let Some(text) = self.read_optional("RECORD")? {
            return Ok(Record::parse(&text)
                .entries()
                .iter()
                .map(|entry| self.location.join(&entry.path))
                .collect());
        }
        if let Some(text) = self.read_optional("installed-files.txt")? {
            return Ok(text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| self.metadata_dir.join(line))
                .collect());
        }
        Ok(Vec::new())
    }

    /// Every existing file of this distribution inside `install_base`.
    fn files(
        &self,
        install_base: &Path,
        layout: &InstallationLayout,
    ) -> Result<BTreeSet<PathBuf>, WheelError> {
        let mut files = BTreeSet::new();

        for listed in self.listed_files()? {
            let file = normalize_lexically(&listed);
            if file.starts_with(install_base) && file.is_file() {
                if is_python_source(&file) {
                    files.extend(py_compiled(&file));
                }
                files.insert(file);
            }
        }

        if let Some(top_level) = self.read_optional("top_level.txt")? {
            for package in top_level.lines().map(str::trim).filter(|line| !line.is_empty()) {
                let module = normalize_lexically(&self.location.join(format!("{package}.py")));
                if !module.starts_with(install_base) {
                    continue;
                }
                if module.is_file() {
                    files.extend(py_compiled(&module));
                    files.insert(module);
                }
                let package_dir = normalize_lexically(&self.location.join(package));
                if package_dir.is_dir() {
                    files.extend(
                        WalkDir::new(&package_dir)
                            .into_iter()
                            .filter_map(Result::ok)
                            .filter(|entry| entry.file_type().is_file())
                            .map(walkdir::DirEntry::into_path),
                    );
                }
            }
        }

        if let Some(text) = self.read_optional("entry_points.txt")? {
            for script in EntryPoints::parse(&text).console_scripts() {
                for filename in script_filenames(&script.script_name) {
                    let file = normalize_lexically(&layout.scripts.join(filename));
                    if file.starts_with(install_base) && file.is_file() {
                        files.insert(file);
                    }
                }
            }
        }

        Ok(files)
    }
}

fn is_python_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "py")
}

/// Bytecode compiled from `file`: `__pycache__/{stem}.*.pyc`, `.pyc`, `.pyo`.
fn py_compiled(file: &Path) -> Vec<PathBuf> {
    let mut compiled = Vec::new();
    let (Some(parent), Some(stem)) = (file.parent(), file.file_stem().and_then(|s| s.to_str()))
    else {
        return compiled;
    };
    let prefix = format!("{stem}.");
    if let Ok(entries) = fs::read_dir(parent.join("__pycache__")) {
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".pyc"));
            if matches && path.is_file() {
                compiled.push(path);
            }
        }
    }
    for extension in ["pyc", "pyo"] {
        let sibling = file.with_extension(extension);
        if sibling.is_file() {
            compiled.push(sibling);
        }
    }
    compiled
}

/// Directories between `base` (exclusive) and `file` (exclusive).
fn parent_dirs(file: &Path, base: &Path) -> Vec<PathBuf> {
    let Some(relative) = file.parent().and_then(|parent| parent.strip_prefix(base).ok()) else {
        return Vec::new();
    };
    let mut current = base.to_path_buf();
    relative
        .components()
        .map(|component| {
            current.push(component);
            current.clone()
        })
        .collect()
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
