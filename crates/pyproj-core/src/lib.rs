//! Building Python projects through their PEP 517 backend.
//!
//! Hooks run in a fresh interpreter per call ([`AsyncHookCaller`]), wrapped
//! by ordered decorators ([`DecoratorRegistry`]); projects and their
//! backend-reported metadata are cached per directory ([`HookSession`]).

mod build;
mod config;
pub mod decorators;
pub mod hooks;
mod install;
mod metadata;
mod outcome;
mod project;

pub use build::{build_project, build_projects, BuildReport, BuildRequest};
pub use config::{
    Config, GlobalOptions, HookConfig, HookOutput, InstallConfig, HOOK_TIMEOUT_ENV,
    INSTALLER_ENV, MAX_CAPTURE_ENV,
};
pub use decorators::{DecoratorRegistry, HookCallerDecorator, SetuptoolsDecorator};
pub use hooks::{
    AsyncHookCaller, ConfigSettings, ConfigValue, DuplexChannel, HookArguments, HookCaller,
    HookCallerExt, HookError, KNOWN_HOOKS,
};
pub use install::{
    install_archive, resolve_layout, uninstall, InstallRequest, FALLBACK_PYTHON_VERSION,
};
pub use metadata::load_metadata;
pub use outcome::{format_status_message, to_json_response, CommandStatus, ExecutionOutcome};
pub use project::{
    identify_project, project_dependencies, HookSession, ProjectCache, ProjectDependencies,
    ProjectEntry,
};
