use std::{
    fs,
    path::{Path, PathBuf},
};

use pyproj_python::InstallationLayout;
use tracing::debug;

use crate::error::IoContext;
use crate::{ConsoleScriptSpec, WheelError};

/// Files a launcher for `name` occupies in the scripts directory.
pub fn script_filenames(name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![format!("{name}-script.py"), format!("{name}.cmd")]
    } else {
        vec![name.to_string()]
    }
}

/// Interpreter a launcher re-executes with.
pub(crate) fn launcher_interpreter(layout: &InstallationLayout) -> String {
    if cfg!(windows) {
        layout
            .python
            .as_ref()
            .map_or_else(|| "python".to_string(), |path| path.display().to_string())
    } else {
        layout.shebang_python()
    }
}

/// Generate the launcher files for one console script; returns every file written.
pub fn write_console_script(
    script_dir: &Path,
    spec: &ConsoleScriptSpec,
    python: &str,
) -> Result<Vec<PathBuf>, WheelError> {
    fs::create_dir_all(script_dir).io_context("create", script_dir)?;
    let body = launcher_body(spec);
    let mut written = Vec::new();
    for filename in script_filenames(&spec.script_name) {
        let path = script_dir.join(&filename);
        let contents = if filename.ends_with(".cmd") {
            format!(
                "@echo off\r\n\"{python}\" \"%~dp0{}-script.py\" %*\r\n",
                spec.script_name
            )
        } else {
            format!("#!{python}\n{body}")
        };
        fs::write(&path, contents).io_context("write", &path)?;
        set_exec_permissions(&path)?;
        debug!(script = %path.display(), target = %spec.entry_reference, "wrote launcher");
        written.push(path);
    }
    Ok(written)
}

fn launcher_body(spec: &ConsoleScriptSpec) -> String {
    let module = python_literal(spec.module());
    match spec.callable() {
        Some(callable) => {
            let parts: Vec<&str> = callable.split('.').filter(|part| !part.is_empty()).collect();
            let parts = python_literal(parts);
            format!(
                "import importlib\nimport sys\n\ndef _load():\n    target = importlib.import_module({module})\n    for attr in {parts}:\n        target = getattr(target, attr)\n    return target\n\nif __name__ == '__main__':\n    sys.exit(_load()())\n"
            )
        }
        None => format!(
            "import runpy\n\nif __name__ == '__main__':\n    runpy.run_module({module}, run_name='__main__', alter_sys=True)\n"
        ),
    }
}

/// JSON strings and arrays of strings are valid Python literals.
fn python_literal(value: impl Into<serde_json::Value>) -> String {
    value.into().to_string()
}

pub(crate) fn set_exec_permissions(path: &Path) -> Result<(), WheelError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .io_context("set permissions on", path)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn launcher_imports_and_calls_target() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let spec = ConsoleScriptSpec {
            script_name: "foo".into(),
            entry_reference: "pkg.mod:Cli.main".into(),
        };
        let written = write_console_script(temp.path(), &spec, "/usr/bin/python3")?;
        assert_eq!(written.len(), script_filenames("foo").len());
        let launcher = written
            .iter()
            .find(|path| !path.to_string_lossy().ends_with(".cmd"))
            .ok_or_else(|| anyhow::anyhow!("no python launcher written"))?;
        let contents = fs::read_to_string(launcher)?;
        assert!(contents.starts_with("#!/usr/bin/python3\n"));
        assert!(contents.contains("importlib.import_module(\"pkg.mod\")"));
        assert!(contents.contains("[\"Cli\",\"main\"]"));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(fs::metadata(launcher)?.permissions().mode() & 0o111, 0o111);
        }
        Ok(())
    }

    #[test]
    fn non_ascii_targets_are_valid_python_literals() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let spec = ConsoleScriptSpec {
            script_name: "cafe".into(),
            entry_reference: "caf\u{e9}.outil:ex\u{e9}cuter".into(),
        };
        let body = launcher_body(&spec);
        assert!(body.contains("importlib.import_module(\"caf\u{e9}.outil\")"), "{body}");
        assert!(body.contains("[\"ex\u{e9}cuter\"]"), "{body}");
        assert!(!body.contains("\\u{"), "{body}");

        let quoted = launcher_body(&ConsoleScriptSpec {
            script_name: "odd".into(),
            entry_reference: "pkg\"x\\y".into(),
        });
        assert!(quoted.contains("run_module(\"pkg\\\"x\\\\y\""), "{quoted}");

        let Ok(python) = pyproj_python::detect_interpreter() else {
            eprintln!("skipping syntax check: no python interpreter");
            return Ok(());
        };
        let script = temp.path().join("launcher.py");
        fs::write(&script, &body)?;
        let status = std::process::Command::new(python)
            .args(["-c", "import ast, sys; ast.parse(open(sys.argv[1], encoding='utf-8').read())"])
            .arg(&script)
            .status()?;
        assert!(status.success());
        Ok(())
    }
}
