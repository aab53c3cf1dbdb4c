use std::{
    collections::BTreeMap,
    env,
    ffi::OsString,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use pyproj_domain::BackendDescriptor;
use serde_json::Value;
use tokio::{process::Command, task};
use tracing::{debug, warn};

use super::{
    channel::DuplexChannel,
    error::HookError,
    process::{self, RunOutput},
    scripts, HookArguments, HookCaller,
};
use crate::config::{Config, HookOutput, DEFAULT_MAX_CAPTURE_BYTES};

const LIST_HOOKS: &str = "list_hooks";

/// Runs every hook in a fresh interpreter subprocess.
///
/// Arguments travel to the child as JSON through a [`DuplexChannel`], the
/// return value comes back the same way. Stdout and stderr are captured
/// separately and only stderr is used for failure diagnostics.
#[derive(Debug, Clone)]
pub struct AsyncHookCaller {
    backend: BackendDescriptor,
    project_dir: PathBuf,
    python: String,
    env: Option<BTreeMap<String, String>>,
    output: HookOutput,
    timeout: Option<Duration>,
    max_capture_bytes: usize,
}

impl AsyncHookCaller {
    pub fn new(
        backend: BackendDescriptor,
        project_dir: impl Into<PathBuf>,
        python: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            project_dir: project_dir.into(),
            python: python.into(),
            env: None,
            output: HookOutput::default(),
            timeout: None,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }

    /// Caller honoring the interpreter, timeout and capture settings of `config`.
    pub fn from_config(
        backend: BackendDescriptor,
        project_dir: impl Into<PathBuf>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let hooks = config.hooks();
        Ok(Self::new(backend, project_dir, config.python()?)
            .with_output(hooks.output)
            .with_timeout(hooks.timeout)
            .with_max_capture_bytes(hooks.max_capture_bytes))
    }

    /// Replace the inherited process environment.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: HookOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_capture_bytes(mut self, limit: usize) -> Self {
        self.max_capture_bytes = limit;
        self
    }

    pub fn backend(&self) -> &BackendDescriptor {
        &self.backend
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn command(&self, script: &str) -> Result<Command, HookError> {
        let mut command = Command::new(&self.python);
        command
            .arg("-c")
            .arg(script)
            .arg(&self.backend.backend)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(env) = &self.env {
            command.env_clear().envs(env);
        }
        command
            .env("PYTHONPATH", self.python_path()?)
            .env("PYTHONIOENCODING", "utf-8");
        Ok(command)
    }

    /// Backend search paths first, then whatever `PYTHONPATH` already held.
    fn python_path(&self) -> Result<OsString, HookError> {
        let existing = match &self.env {
            Some(env) => env.get("PYTHONPATH").map(OsString::from),
            None => env::var_os("PYTHONPATH"),
        };
        let inherited: Vec<PathBuf> = existing
            .as_deref()
            .map(|value| env::split_paths(value).collect())
            .unwrap_or_default();
        env::join_paths(self.backend.extra_search_paths.iter().chain(&inherited)).map_err(
            |err| HookError::Spawn {
                python: self.python.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, err),
            },
        )
    }

    async fn run(
        &self,
        hook: &str,
        mut command: Command,
        channel: Option<&mut DuplexChannel>,
    ) -> Result<RunOutput, HookError> {
        let spawned = match channel {
            Some(channel) => channel.spawn(&mut command),
            None => command.spawn(),
        };
        let child = spawned.map_err(|source| HookError::Spawn {
            python: self.python.clone(),
            source,
        })?;

        let waiting = process::wait_with_output(child, self.output, self.max_capture_bytes);
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, waiting).await.map_err(|_| {
                warn!(backend = %self.backend.backend, hook, "hook timed out; killing child");
                HookError::Timeout {
                    backend: self.backend.backend.clone(),
                    hook: hook.to_string(),
                    seconds: limit.as_secs(),
                }
            })?,
            None => waiting.await,
        }?;

        if output.code != 0 {
            return Err(HookError::Failed {
                backend: self.backend.backend.clone(),
                hook: hook.to_string(),
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl HookCaller for AsyncHookCaller {
    fn backend_name(&self) -> &str {
        &self.backend.backend
    }

    async fn call_hook(&self, hook: &str, arguments: HookArguments) -> Result<Value, HookError> {
        debug!(backend = %self.backend.backend, hook, "calling hook");
        let payload = serde_json::to_vec(&arguments).map_err(|source| HookError::Encode {
            hook: hook.to_string(),
            source,
        })?;

        let mut channel = DuplexChannel::open()?;
        let (child_in, child_out) = channel
            .child_handles()
            .ok_or_else(|| io::Error::other("duplex channel lost its child ends"))?;
        let mut writer = channel.take_writer()?;
        let mut reader = channel.take_reader()?;

        // The request is in flight before the child exists.
        let feeding = task::spawn_blocking(move || {
            writer.write_all(&payload)?;
            writer.flush()
        });
        let collecting = task::spawn_blocking(move || {
            let mut response = Vec::new();
            reader.read_to_end(&mut response).map(|_| response)
        });

        let mut command = self.command(&scripts::call_hook_script())?;
        command.arg(hook).arg(&child_in).arg(&child_out);
        let outcome = self.run(hook, command, Some(&mut channel)).await;
        drop(channel);
        outcome?;

        match feeding.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(hook, "hook input was not fully consumed: {err}"),
            Err(err) => return Err(HookError::Channel(io::Error::other(err))),
        }
        let response = collecting
            .await
            .map_err(|err| HookError::Channel(io::Error::other(err)))??;
        serde_json::from_slice(&response).map_err(|source| HookError::Decode {
            hook: hook.to_string(),
            source,
        })
    }

    async fn list_hooks(&self) -> Result<Vec<String>, HookError> {
        let command = self.command(&scripts::list_hooks_script())?;
        let output = self.run(LIST_HOOKS, command, None).await?;
        Ok(public_names(&output.stdout))
    }
}

fn public_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.starts_with('_'))
        .map(ToOwned::to_owned)
        .collect()
}
