use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use pyproj_python::{InstallationLayout, SchemeKey};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;
use zip::{result::ZipError, ZipArchive};

use crate::error::IoContext;
use crate::record::record_path;
use crate::scripts::{launcher_interpreter, set_exec_permissions};
use crate::{
    remove_distributions, write_and_record, write_console_script, EntryPoints, Record,
    RecordEntry, WheelError, WheelFilename, WheelMetadata,
};

pub const DEFAULT_INSTALLER: &str = "pyproj";

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Launcher directory relative to the install base, replacing the scheme's.
    pub script_dir_override: Option<PathBuf>,
    /// Source tree of an editable install, recorded in `direct_url.json`.
    pub editable_source: Option<PathBuf>,
    /// Name written to `INSTALLER`.
    pub installer: String,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            script_dir_override: None,
            editable_source: None,
            installer: DEFAULT_INSTALLER.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstalledWheel {
    pub dist_info: PathBuf,
    pub library_root: PathBuf,
    pub metadata: WheelMetadata,
    pub scripts: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Install `wheel` into `layout`, replacing any installed distribution of
/// the same name, and return the installed dist-info directory.
pub fn install_wheel(
    wheel: &Path,
    layout: &InstallationLayout,
    options: &InstallOptions,
) -> Result<InstalledWheel, WheelError> {
    let file_name = wheel
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| WheelError::InvalidFilename(wheel.display().to_string()))?;
    let filename = WheelFilename::parse(file_name)?;
    let dist_info_dir = filename.dist_info_dir();
    let data_dir = filename.data_dir();
    let wheel_member = format!("{dist_info_dir}/WHEEL");
    let record_member = format!("{dist_info_dir}/RECORD");
    let entry_points_member = format!("{dist_info_dir}/entry_points.txt");

    let removed = remove_distributions(&filename.distribution, layout)?;
    if !removed.is_empty() {
        debug!(
            distribution = %filename.distribution,
            removed = removed.removed_files,
            "removed previous installation"
        );
    }

    let file = File::open(wheel).io_context("open", wheel)?;
    let mut archive = ZipArchive::new(file)?;

    let wheel_text = read_member(&mut archive, &wheel_member)?;
    let (metadata, warning) = WheelMetadata::from_wheel_file(&filename, &wheel_text)?;
    let mut warnings = Vec::new();
    if let Some(warning) = warning {
        warn!(wheel = %wheel.display(), "{warning}");
        warnings.push(warning);
    }

    let libdir = layout.library_root(metadata.root_is_purelib).to_path_buf();
    let mut record = Record::parse(&read_member(&mut archive, &record_member)?);

    for entry in record.entries_mut() {
        if entry.path == record_member || entry.path.ends_with('/') {
            continue;
        }
        let data_relative = entry
            .path
            .strip_prefix(&data_dir)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string);
        let Some(data_relative) = data_relative else {
            extract_verbatim(&mut archive, &entry.path, &libdir)?;
            continue;
        };

        let (category, subpath) = data_relative
            .split_once('/')
            .filter(|(_, subpath)| !subpath.is_empty())
            .ok_or_else(|| WheelError::UnsafePath(entry.path.clone()))?;
        let key = SchemeKey::from_str(category).map_err(|_| WheelError::UnknownCategory {
            category: category.to_string(),
            path: entry.path.clone(),
        })?;
        let subpath = safe_relative(subpath).ok_or_else(|| WheelError::UnsafePath(entry.path.clone()))?;
        let target = layout.resolve(key, &filename.distribution).join(subpath);
        extract_to(&mut archive, &entry.path, &target)?;
        if key == SchemeKey::Scripts {
            set_exec_permissions(&target)?;
        }
        entry.path = record_path(&target, &libdir);
    }

    record.push(write_and_record(
        &libdir,
        format!("{dist_info_dir}/INSTALLER"),
        &[options.installer.as_str()],
    )?);

    if let Some(source) = &options.editable_source {
        let source = std::path::absolute(source).io_context("resolve", source)?;
        let url = Url::from_file_path(&source).map_err(|()| WheelError::InvalidSource(source.clone()))?;
        let descriptor = json!({
            "url": url.as_str(),
            "dir_info": {"editable": true},
        });
        record.push(write_and_record(
            &libdir,
            format!("{dist_info_dir}/direct_url.json"),
            &[descriptor.to_string()],
        )?);
    }

    let mut scripts = Vec::new();
    if archive.file_names().any(|name| name == entry_points_member) {
        let entry_points = EntryPoints::parse(&read_member(&mut archive, &entry_points_member)?);
        let console_scripts = entry_points.console_scripts();
        if !console_scripts.is_empty() {
            let script_dir = options
                .script_dir_override
                .as_ref()
                .map_or_else(|| layout.scripts.clone(), |dir| layout.base.join(dir));
            let python = launcher_interpreter(layout);
            for spec in &console_scripts {
                for path in write_console_script(&script_dir, spec, &python)? {
                    record.push(RecordEntry::unhashed(record_path(&path, &libdir)));
                    scripts.push(path);
                }
            }
        }
    }

    let dist_info = libdir.join(&dist_info_dir);
    record.write(&dist_info.join("RECORD"))?;
    info!(
        distribution = %metadata.distribution,
        version = %metadata.version,
        path = %dist_info.display(),
        "installed wheel"
    );
    Ok(InstalledWheel {
        dist_info,
        library_root: libdir,
        metadata,
        scripts,
        warnings,
    })
}

fn read_member(archive: &mut ZipArchive<File>, name: &str) -> Result<String, WheelError> {
    let mut member = match archive.by_name(name) {
        Ok(member) => member,
        Err(ZipError::FileNotFound) => return Err(WheelError::MissingMember(name.to_string())),
        Err(err) => return Err(err.into()),
    };
    let mut text = String::new();
    member
        .read_to_string(&mut text)
        .map_err(|err| WheelError::io(format!("failed to read {name}"), err))?;
    Ok(text)
}

fn extract_verbatim(
    archive: &mut ZipArchive<File>,
    name: &str,
    libdir: &Path,
) -> Result<(), WheelError> {
    let relative = {
        let member = match archive.by_name(name) {
            Ok(member) => member,
            Err(ZipError::FileNotFound) => return Err(WheelError::MissingMember(name.to_string())),
            Err(err) => return Err(err.into()),
        };
        member
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| WheelError::UnsafePath(name.to_string()))?
    };
    extract_to(archive, name, &libdir.join(relative))
}

fn extract_to(archive: &mut ZipArchive<File>, name: &str, target: &Path) -> Result<(), WheelError> {
    let mut member = match archive.by_name(name) {
        Ok(member) => member,
        Err(ZipError::FileNotFound) => return Err(WheelError::MissingMember(name.to_string())),
        Err(err) => return Err(err.into()),
    };
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).io_context("create", parent)?;
    }
    let mut out = File::create(target).io_context("create", target)?;
    io::copy(&mut member, &mut out).io_context("extract", target)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = member.unix_mode().filter(|mode| mode & 0o111 != 0) {
            fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o777))
                .io_context("set permissions on", target)?;
        }
    }
    Ok(())
}

/// `subpath` as a path with only normal components.
fn safe_relative(subpath: &str) -> Option<PathBuf> {
    let path = Path::new(subpath);
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        .then(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{layout_in, snapshot, WheelFixture};
    use tempfile::tempdir;

    #[test]
    fn installs_into_purelib_and_records_installer() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let base = temp.path().join("prefix");
        let layout = layout_in(&base);
        let fixture = WheelFixture::new("pkg", "1.0")
            .file("pkg/__init__.py", "VALUE = 1\n")
            .file("pkg/mod.py", "def main():\n    return 0\n");
        let wheel = fixture.write(temp.path())?;

        let installed = install_wheel(&wheel, &layout, &InstallOptions::default())?;
        assert_eq!(installed.dist_info, layout.purelib.join("pkg-1.0.dist-info"));
        assert!(installed.warnings.is_empty());
        assert!(layout.purelib.join("pkg/mod.py").is_file());
        assert_eq!(
            fs::read_to_string(installed.dist_info.join("INSTALLER"))?.trim_end(),
            DEFAULT_INSTALLER
        );

        let record = Record::read(&installed.dist_info.join("RECORD"))?;
        let paths: Vec<&str> = record.entries().iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"pkg/__init__.py"));
        assert!(paths.contains(&"pkg-1.0.dist-info/RECORD"));
        assert_eq!(paths.last(), Some(&"pkg-1.0.dist-info/INSTALLER"));
        Ok(())
    }

    #[test]
    fn data_dir_entries_are_redirected() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let base = temp.path().join("prefix");
        let layout = layout_in(&base);
        let wheel = WheelFixture::new("pkg", "1.0")
            .file("pkg/__init__.py", "")
            .file("pkg-1.0.data/scripts/run", "#!/bin/sh\necho run\n")
            .file("pkg-1.0.data/data/share/pkg/config.ini", "[x]\n")
            .file("pkg-1.0.data/headers/pkg.h", "int x;\n")
            .write(temp.path())?;

        let installed = install_wheel(&wheel, &layout, &InstallOptions::default())?;
        let run = layout.scripts.join("run");
        assert!(run.is_file());
        assert!(!layout.purelib.join("pkg-1.0.data").exists());
        assert!(base.join("share/pkg/config.ini").is_file());
        assert!(layout.include.join("pkg/pkg.h").is_file());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(fs::metadata(&run)?.permissions().mode() & 0o111, 0o111);
        }

        let record = Record::read(&installed.dist_info.join("RECORD"))?;
        let expected = record_path(&run, &layout.purelib);
        assert!(record.entries().iter().any(|entry| entry.path == expected));
        assert!(!record
            .entries()
            .iter()
            .any(|entry| entry.path.starts_with("pkg-1.0.data/")));
        Ok(())
    }

    #[test]
    fn purelib_and_platlib_data_land_in_their_library_roots() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let base = temp.path().join("prefix");
        let mut layout = layout_in(&base);
        layout.platlib = base.join("lib64").join("site-packages");
        let wheel = WheelFixture::new("pkg", "1.0")
            .file("pkg/__init__.py", "")
            .file("pkg-1.0.data/purelib/pkg_pure/__init__.py", "PURE = 1\n")
            .file("pkg-1.0.data/platlib/pkg_native/__init__.py", "NATIVE = 1\n")
            .write(temp.path())?;

        let installed = install_wheel(&wheel, &layout, &InstallOptions::default())?;
        assert_eq!(installed.library_root, layout.purelib);
        assert!(layout.purelib.join("pkg_pure/__init__.py").is_file());
        assert!(layout.platlib.join("pkg_native/__init__.py").is_file());
        assert!(!layout.purelib.join("pkg_native").exists());

        let record = Record::read(&installed.dist_info.join("RECORD"))?;
        let paths: Vec<&str> = record.entries().iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"pkg_pure/__init__.py"), "{paths:?}");
        let native = record_path(&layout.platlib.join("pkg_native/__init__.py"), &layout.purelib);
        assert!(paths.contains(&native.as_str()), "{paths:?}");
        assert!(native.starts_with("../"), "{native}");
        Ok(())
    }

    #[test]
    fn wheels_with_a_build_tag_install_and_record_it() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let layout = layout_in(&temp.path().join("prefix"));
        let wheel = WheelFixture::new("pkg", "1.0")
            .build_tag("1")
            .file("pkg/__init__.py", "VALUE = 1\n")
            .write(temp.path())?;
        assert!(wheel.ends_with("pkg-1.0-1-py3-none-any.whl"));

        let installed = install_wheel(&wheel, &layout, &InstallOptions::default())?;
        assert_eq!(installed.metadata.build_tag.as_deref(), Some("1"));
        assert_eq!(installed.dist_info, layout.purelib.join("pkg-1.0.dist-info"));
        assert!(layout.purelib.join("pkg/__init__.py").is_file());
        assert!(installed.dist_info.join("RECORD").is_file());
        Ok(())
    }

    #[test]
    fn unknown_data_category_is_fatal() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let layout = layout_in(&temp.path().join("prefix"));
        let wheel = WheelFixture::new("pkg", "1.0")
            .file("pkg-1.0.data/stdlib/evil.py", "")
            .write(temp.path())?;
        let err = install_wheel(&wheel, &layout, &InstallOptions::default())
            .err()
            .ok_or_else(|| anyhow::anyhow!("install should fail"))?;
        assert!(matches!(err, WheelError::UnknownCategory { ref category, .. } if category == "stdlib"));
        Ok(())
    }

    #[test]
    fn wheel_version_gate() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let layout = layout_in(&temp.path().join("prefix"));

        let newer_major = WheelFixture::new("pkg", "1.0")
            .wheel_version("2.0")
            .file("pkg/__init__.py", "")
            .write(temp.path())?;
        assert!(matches!(
            install_wheel(&newer_major, &layout, &InstallOptions::default()),
            Err(WheelError::UnsupportedVersion(_))
        ));

        let newer_minor = WheelFixture::new("pkg", "1.0")
            .wheel_version("1.1")
            .file("pkg/__init__.py", "")
            .write(temp.path())?;
        let installed = install_wheel(&newer_minor, &layout, &InstallOptions::default())?;
        assert_eq!(installed.warnings.len(), 1);
        assert!(layout.purelib.join("pkg/__init__.py").is_file());
        Ok(())
    }

    #[test]
    fn console_script_gets_one_launcher_and_record_entry() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let base = temp.path().join("prefix");
        let layout = layout_in(&base);
        let wheel = WheelFixture::new("pkg", "1.0")
            .file("pkg/mod.py", "def main():\n    return 0\n")
            .file("pkg-1.0.dist-info/entry_points.txt", "[console_scripts]\nfoo = pkg.mod:main\n")
            .write(temp.path())?;

        let installed = install_wheel(&wheel, &layout, &InstallOptions::default())?;
        let expected: Vec<PathBuf> = crate::script_filenames("foo")
            .into_iter()
            .map(|name| layout.scripts.join(name))
            .collect();
        assert_eq!(installed.scripts, expected);
        assert_eq!(snapshot(&layout.scripts).len(), expected.len());

        let record = Record::read(&installed.dist_info.join("RECORD"))?;
        for script in &expected {
            let path = record_path(script, &layout.purelib);
            let entry = record
                .entries()
                .iter()
                .find(|entry| entry.path == path)
                .ok_or_else(|| anyhow::anyhow!("missing record entry for {path}"))?;
            assert_eq!(entry.hash, None);
            assert_eq!(entry.size, None);
        }
        Ok(())
    }

    #[test]
    fn script_dir_override_is_relative_to_base() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let base = temp.path().join("prefix");
        let layout = layout_in(&base);
        let wheel = WheelFixture::new("pkg", "1.0")
            .file("pkg-1.0.dist-info/entry_points.txt", "[console_scripts]\nfoo = pkg:main\n")
            .write(temp.path())?;
        let options = InstallOptions {
            script_dir_override: Some(PathBuf::from("lib/pkg")),
            ..InstallOptions::default()
        };
        let installed = install_wheel(&wheel, &layout, &options)?;
        assert!(installed
            .scripts
            .iter()
            .all(|script| script.starts_with(base.join("lib/pkg"))));
        assert!(!layout.scripts.exists());
        Ok(())
    }

    #[test]
    fn editable_install_writes_direct_url() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let layout = layout_in(&temp.path().join("prefix"));
        let source = temp.path().join("checkout");
        fs::create_dir_all(&source)?;
        let wheel = WheelFixture::new("pkg", "1.0")
            .file("pkg.pth", "/checkout\n")
            .write(temp.path())?;
        let options = InstallOptions {
            editable_source: Some(source.clone()),
            ..InstallOptions::default()
        };
        let installed = install_wheel(&wheel, &layout, &options)?;
        let raw = fs::read_to_string(installed.dist_info.join("direct_url.json"))?;
        assert_eq!(raw.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(value["dir_info"]["editable"], serde_json::Value::Bool(true));
        let url = Url::parse(value["url"].as_str().unwrap_or_default())?;
        assert_eq!(url.to_file_path().ok(), Some(source));
        Ok(())
    }

    #[test]
    fn platlib_root_when_not_purelib() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let mut layout = layout_in(&temp.path().join("prefix"));
        layout.platlib = temp.path().join("prefix/lib64/site-packages");
        let wheel = WheelFixture::new("native", "2.0")
            .platlib()
            .file("native/__init__.py", "")
            .write(temp.path())?;
        let installed = install_wheel(&wheel, &layout, &InstallOptions::default())?;
        assert_eq!(installed.library_root, layout.platlib);
        assert!(layout.platlib.join("native/__init__.py").is_file());
        Ok(())
    }

    #[test]
    fn reinstall_is_idempotent_and_removal_restores_tree() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let base = temp.path().join("prefix");
        fs::create_dir_all(base.join("etc"))?;
        fs::write(base.join("etc/unrelated.conf"), "keep")?;
        let layout = layout_in(&base);
        let before = snapshot(&base);

        let old = WheelFixture::new("pkg", "1.0")
            .file("pkg/__init__.py", "")
            .file("pkg/legacy.py", "")
            .write(temp.path())?;
        install_wheel(&old, &layout, &InstallOptions::default())?;
        assert!(layout.purelib.join("pkg/legacy.py").is_file());

        let wheel_dir = temp.path().join("new");
        fs::create_dir_all(&wheel_dir)?;
        let new = WheelFixture::new("pkg", "2.0")
            .file("pkg/__init__.py", "")
            .file("pkg-2.0.data/scripts/tool", "#!/bin/sh\n")
            .file("pkg-2.0.dist-info/entry_points.txt", "[console_scripts]\nfoo = pkg:main\n")
            .write(&wheel_dir)?;
        install_wheel(&new, &layout, &InstallOptions::default())?;
        let once = snapshot(&base);
        install_wheel(&new, &layout, &InstallOptions::default())?;
        assert_eq!(snapshot(&base), once);
        assert!(!layout.purelib.join("pkg/legacy.py").exists());
        assert!(!layout.purelib.join("pkg-1.0.dist-info").exists());

        remove_distributions("pkg", &layout)?;
        assert_eq!(snapshot(&base), before);
        Ok(())
    }

    #[test]
    fn invalid_filename_is_rejected_before_touching_disk() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let layout = layout_in(&temp.path().join("prefix"));
        let bogus = temp.path().join("pkg-1.0.whl");
        fs::write(&bogus, "not a zip")?;
        assert!(matches!(
            install_wheel(&bogus, &layout, &InstallOptions::default()),
            Err(WheelError::InvalidFilename(_))
        ));
        assert!(!layout.base.exists());
        Ok(())
    }

    #[test]
    fn unsafe_members_are_rejected() {
        assert!(safe_relative("pkg/data.txt").is_some());
        assert!(safe_relative("../escape").is_none());
        assert!(safe_relative("/etc/passwd").is_none());
    }
}
