use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use pyproj_domain::BackendDescriptor;
use serde_json::Value;
use tempfile::TempDir;
use tracing::debug;

use super::HookCallerDecorator;
use crate::hooks::{HookArguments, HookCaller, HookError};

const SETUPTOOLS_MODULE: &str = "setuptools.build_meta";
const LEGACY_OBJECT: &str = "__legacy__";

const BUILD_OPTION: &str = "--build-option";

/// Keeps setuptools from writing `*.egg-info` and `build/` into the source
/// tree by pointing both at throwaway directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetuptoolsDecorator;

impl HookCallerDecorator for SetuptoolsDecorator {
    fn name(&self) -> &str {
        "setuptools"
    }

    fn decorate(&self, caller: Arc<dyn HookCaller>) -> anyhow::Result<Arc<dyn HookCaller>> {
        if is_setuptools_backend(caller.backend_name()) {
            Ok(Arc::new(SetuptoolsHookCaller { inner: caller }))
        } else {
            Ok(caller)
        }
    }
}

/// `setuptools.build_meta`, optionally with its `__legacy__` object.
fn is_setuptools_backend(backend: &str) -> bool {
    let descriptor = BackendDescriptor::new(backend);
    descriptor.module() == SETUPTOOLS_MODULE
        && descriptor.object().map_or(true, |object| object == LEGACY_OBJECT)
}

struct SetuptoolsHookCaller {
    inner: Arc<dyn HookCaller>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scratch {
    EggInfo,
    EggInfoAndBuild,
}

#[async_trait]
impl HookCaller for SetuptoolsHookCaller {
    fn backend_name(&self) -> &str {
        self.inner.backend_name()
    }

    async fn call_hook(&self, hook: &str, mut arguments: HookArguments) -> Result<Value, HookError> {
        let scratch = match hook {
            "build_wheel" => Scratch::EggInfoAndBuild,
            "get_requires_for_build_wheel" | "prepare_metadata_for_build_wheel" => Scratch::EggInfo,
            _ => return self.inner.call_hook(hook, arguments).await,
        };

        let scratch_dir = |hook: &str| {
            TempDir::new().map_err(|source| HookError::Scratch {
                hook: hook.to_string(),
                source,
            })
        };
        let egg_base = scratch_dir(hook)?;
        append_build_options(
            &mut arguments,
            &["egg_info".to_string(), format!("--egg-base={}", display(egg_base.path()))],
        );
        let build_base = if scratch == Scratch::EggInfoAndBuild {
            let build_base = scratch_dir(hook)?;
            append_build_options(
                &mut arguments,
                &["build".to_string(), format!("--build-base={}", display(build_base.path()))],
            );
            Some(build_base)
        } else {
            None
        };
        debug!(hook, "redirecting setuptools scratch output");

        let result = self.inner.call_hook(hook, arguments).await;
        drop(build_base);
        drop(egg_base);
        result
    }

    async fn list_hooks(&self) -> Result<Vec<String>, HookError> {
        self.inner.list_hooks().await
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Append to `config_settings["--build-option"]`, promoting a single string
/// value to a list.
fn append_build_options(arguments: &mut HookArguments, options: &[String]) {
    let settings = arguments
        .entry("config_settings")
        .or_insert_with(|| Value::Object(HookArguments::new()));
    if !settings.is_object() {
        *settings = Value::Object(HookArguments::new());
    }
    let Value::Object(settings) = settings else {
        return;
    };
    let existing = settings.remove(BUILD_OPTION);
    let mut values: Vec<Value> = match existing {
        Some(Value::Array(values)) => values,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    };
    values.extend(options.iter().cloned().map(Value::from));
    settings.insert(BUILD_OPTION.to_string(), Value::Array(values));
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::hooks::testing::RecordingCaller;

    fn build_options(arguments: &HookArguments) -> Vec<String> {
        arguments["config_settings"][BUILD_OPTION]
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn only_setuptools_backends_are_wrapped() -> anyhow::Result<()> {
        let flit: Arc<dyn HookCaller> = Arc::new(RecordingCaller::new("flit_core.buildapi"));
        let decorated = SetuptoolsDecorator.decorate(Arc::clone(&flit))?;
        assert!(Arc::ptr_eq(&flit, &decorated));

        let legacy: Arc<dyn HookCaller> =
            Arc::new(RecordingCaller::new("setuptools.build_meta:__legacy__"));
        let decorated = SetuptoolsDecorator.decorate(Arc::clone(&legacy))?;
        assert!(!Arc::ptr_eq(&legacy, &decorated));
        assert_eq!(decorated.backend_name(), "setuptools.build_meta:__legacy__");
        Ok(())
    }

    #[test]
    fn setuptools_backends_match_by_module_and_object() {
        assert!(is_setuptools_backend("setuptools.build_meta"));
        assert!(is_setuptools_backend(" setuptools.build_meta : __legacy__ "));
        assert!(!is_setuptools_backend("setuptools.build_meta:other"));
        assert!(!is_setuptools_backend("setuptools.build_meta_extra"));
        assert!(!is_setuptools_backend("hatchling.build"));
    }

    #[tokio::test]
    async fn build_wheel_redirects_egg_info_and_build() -> anyhow::Result<()> {
        let inner = Arc::new(
            RecordingCaller::new("setuptools.build_meta")
                .respond("build_wheel", json!("demo-1.0-py3-none-any.whl")),
        );
        let caller = SetuptoolsHookCaller {
            inner: Arc::clone(&inner) as Arc<dyn HookCaller>,
        };
        let mut arguments = HookArguments::new();
        arguments.insert(
            "config_settings".into(),
            json!({ "--build-option": "--quiet" }),
        );
        caller.call_hook("build_wheel", arguments).await?;

        let calls = inner.calls();
        let options = build_options(&calls[0].1);
        assert_eq!(options[0], "--quiet");
        assert_eq!(options[1], "egg_info");
        assert!(options[2].starts_with("--egg-base="));
        assert_eq!(options[3], "build");
        assert!(options[4].starts_with("--build-base="));

        let egg_base = PathBuf::from(options[2].trim_start_matches("--egg-base="));
        let build_base = PathBuf::from(options[4].trim_start_matches("--build-base="));
        assert!(!egg_base.exists(), "scratch directories are removed");
        assert!(!build_base.exists());
        Ok(())
    }

    #[tokio::test]
    async fn metadata_hooks_only_redirect_egg_info_even_on_failure() -> anyhow::Result<()> {
        let inner = Arc::new(RecordingCaller::new("setuptools.build_meta"));
        let caller = SetuptoolsHookCaller {
            inner: Arc::clone(&inner) as Arc<dyn HookCaller>,
        };
        let result = caller
            .call_hook("prepare_metadata_for_build_wheel", HookArguments::new())
            .await;
        assert!(matches!(result, Err(HookError::Failed { .. })));

        let calls = inner.calls();
        let options = build_options(&calls[0].1);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0], "egg_info");
        let egg_base = PathBuf::from(options[1].trim_start_matches("--egg-base="));
        assert!(!egg_base.exists());
        Ok(())
    }

    #[tokio::test]
    async fn other_hooks_pass_through_untouched() -> anyhow::Result<()> {
        let inner = Arc::new(
            RecordingCaller::new("setuptools.build_meta").respond("build_sdist", json!("x.tar.gz")),
        );
        let caller = SetuptoolsHookCaller {
            inner: Arc::clone(&inner) as Arc<dyn HookCaller>,
        };
        caller.call_hook("build_sdist", HookArguments::new()).await?;
        assert!(inner.calls()[0].1.is_empty());
        Ok(())
    }
}
