//! The hook invocation channel: a capability interface over a build
//! backend, its subprocess implementation, and typed wrappers for the
//! standard hooks.

mod caller;
mod channel;
mod error;
mod process;
mod scripts;

use std::{collections::BTreeMap, path::Path};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use caller::AsyncHookCaller;
pub use channel::DuplexChannel;
pub use error::HookError;

/// Keyword arguments of one hook call.
pub type HookArguments = Map<String, Value>;

/// Backend-specific `config_settings` passed to most hooks.
pub type ConfigSettings = BTreeMap<String, ConfigValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    One(String),
    Many(Vec<String>),
}

pub const KNOWN_HOOKS: &[&str] = &[
    "build_wheel",
    "build_sdist",
    "build_editable",
    "get_requires_for_build_wheel",
    "get_requires_for_build_sdist",
    "get_requires_for_build_editable",
    "prepare_metadata_for_build_wheel",
    "prepare_metadata_for_build_editable",
];

/// Anything that can run named hooks of one backend.
///
/// Decorators implement this too and hold the caller they wrap.
#[async_trait]
pub trait HookCaller: Send + Sync {
    /// Backend identity as declared, `module` or `module:object`.
    fn backend_name(&self) -> &str;

    async fn call_hook(&self, hook: &str, arguments: HookArguments) -> Result<Value, HookError>;

    /// Public callables exposed by the backend, not limited to [`KNOWN_HOOKS`].
    async fn list_hooks(&self) -> Result<Vec<String>, HookError>;
}

/// Typed wrappers over [`HookCaller::call_hook`] for the standard hooks.
#[async_trait]
pub trait HookCallerExt: HookCaller {
    async fn build_wheel(
        &self,
        wheel_directory: &Path,
        config_settings: Option<&ConfigSettings>,
    ) -> Result<String, HookError> {
        let arguments = directory_arguments("wheel_directory", wheel_directory, config_settings);
        basename("build_wheel", self.call_hook("build_wheel", arguments).await?)
    }

    async fn build_sdist(
        &self,
        sdist_directory: &Path,
        config_settings: Option<&ConfigSettings>,
    ) -> Result<String, HookError> {
        let arguments = directory_arguments("sdist_directory", sdist_directory, config_settings);
        basename("build_sdist", self.call_hook("build_sdist", arguments).await?)
    }

    async fn build_editable(
        &self,
        wheel_directory: &Path,
        config_settings: Option<&ConfigSettings>,
    ) -> Result<String, HookError> {
        let arguments = directory_arguments("wheel_directory", wheel_directory, config_settings);
        basename("build_editable", self.call_hook("build_editable", arguments).await?)
    }

    async fn get_requires_for_build_wheel(
        &self,
        config_settings: Option<&ConfigSettings>,
    ) -> Result<Vec<String>, HookError> {
        requirements(self, "get_requires_for_build_wheel", config_settings).await
    }

    async fn get_requires_for_build_sdist(
        &self,
        config_settings: Option<&ConfigSettings>,
    ) -> Result<Vec<String>, HookError> {
        requirements(self, "get_requires_for_build_sdist", config_settings).await
    }

    async fn get_requires_for_build_editable(
        &self,
        config_settings: Option<&ConfigSettings>,
    ) -> Result<Vec<String>, HookError> {
        requirements(self, "get_requires_for_build_editable", config_settings).await
    }

    async fn prepare_metadata_for_build_wheel(
        &self,
        metadata_directory: &Path,
        config_settings: Option<&ConfigSettings>,
    ) -> Result<String, HookError> {
        let hook = "prepare_metadata_for_build_wheel";
        let arguments =
            directory_arguments("metadata_directory", metadata_directory, config_settings);
        basename(hook, self.call_hook(hook, arguments).await?)
    }

    async fn prepare_metadata_for_build_editable(
        &self,
        metadata_directory: &Path,
        config_settings: Option<&ConfigSettings>,
    ) -> Result<String, HookError> {
        let hook = "prepare_metadata_for_build_editable";
        let arguments =
            directory_arguments("metadata_directory", metadata_directory, config_settings);
        basename(hook, self.call_hook(hook, arguments).await?)
    }
}

impl<T: HookCaller + ?Sized> HookCallerExt for T {}

fn settings_arguments(config_settings: Option<&ConfigSettings>) -> HookArguments {
    let mut arguments = HookArguments::new();
    if let Some(settings) = config_settings {
        let value = settings
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    ConfigValue::One(one) => Value::from(one.as_str()),
                    ConfigValue::Many(many) => Value::from(many.clone()),
                };
                (key.clone(), value)
            })
            .collect::<Map<_, _>>();
        arguments.insert("config_settings".to_string(), Value::Object(value));
    }
    arguments
}

fn directory_arguments(
    key: &str,
    directory: &Path,
    config_settings: Option<&ConfigSettings>,
) -> HookArguments {
    let mut arguments = settings_arguments(config_settings);
    let directory = std::path::absolute(directory).unwrap_or_else(|_| directory.to_path_buf());
    arguments.insert(key.to_string(), Value::from(directory.display().to_string()));
    arguments
}

fn basename(hook: &str, value: Value) -> Result<String, HookError> {
    serde_json::from_value(value).map_err(|source| HookError::Decode {
        hook: hook.to_string(),
        source,
    })
}

async fn requirements<C: HookCaller + ?Sized>(
    caller: &C,
    hook: &str,
    config_settings: Option<&ConfigSettings>,
) -> Result<Vec<String>, HookError> {
    let value = caller
        .call_hook(hook, settings_arguments(config_settings))
        .await?;
    serde_json::from_value(value).map_err(|source| HookError::Decode {
        hook: hook.to_string(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every call and answers from a canned table.
    pub(crate) struct RecordingCaller {
        pub backend: String,
        pub responses: BTreeMap<String, Value>,
        pub calls: Mutex<Vec<(String, HookArguments)>>,
    }

    impl RecordingCaller {
        pub(crate) fn new(backend: &str) -> Self {
            Self {
                backend: backend.to_string(),
                responses: BTreeMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn respond(mut self, hook: &str, value: Value) -> Self {
            self.responses.insert(hook.to_string(), value);
            self
        }

        pub(crate) fn calls(&self) -> Vec<(String, HookArguments)> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl HookCaller for RecordingCaller {
        fn backend_name(&self) -> &str {
            &self.backend
        }

        async fn call_hook(
            &self,
            hook: &str,
            arguments: HookArguments,
        ) -> Result<Value, HookError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((hook.to_string(), arguments));
            }
            self.responses
                .get(hook)
                .cloned()
                .ok_or_else(|| HookError::Failed {
                    backend: self.backend.clone(),
                    hook: hook.to_string(),
                    code: 1,
                    stderr: format!("AttributeError: {hook}"),
                })
        }

        async fn list_hooks(&self) -> Result<Vec<String>, HookError> {
            Ok(self.responses.keys().cloned().collect())
        }
    }
}
