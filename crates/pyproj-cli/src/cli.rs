use std::path::PathBuf;

use clap::{value_parser, ArgAction, Args, Parser, Subcommand};

pub const PYPROJ_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\n{all-args}\n";

pub const PYPROJ_BEFORE_HELP: &str = concat!(
    "pyproj ",
    env!("CARGO_PKG_VERSION"),
    " – Build Python projects through their PEP 517 backend\n\n",
    "  build            Build projects and install the produced wheels.\n",
    "  install          Install a wheel file into an install base.\n",
    "  uninstall        Remove an installed distribution.\n",
    "  hooks            List the callables a project's backend exposes.\n",
    "  requires         Show build, run and test dependencies of a project.\n",
    "  metadata         Show the core metadata a project's backend reports.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "pyproj",
    author,
    version,
    disable_help_subcommand = true,
    before_help = PYPROJ_BEFORE_HELP,
    help_template = PYPROJ_HELP_TEMPLATE
)]
pub struct PyprojCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging and stream backend output (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(
        long,
        value_name = "PATH",
        env = "PYPROJ_PYTHON",
        help = "Interpreter used to run backend hooks",
        global = true
    )]
    pub python: Option<String>,
    #[arg(
        long,
        value_name = "SECONDS",
        help = "Kill hook processes running longer than this (0 disables)",
        global = true
    )]
    pub hook_timeout: Option<u64>,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(
        about = "Build projects through their backend and install the wheels.",
        override_usage = "pyproj build [PATH ...] [--build-base DIR] [--install-base DIR] [--editable]"
    )]
    Build(BuildArgs),
    #[command(
        about = "Install a wheel, replacing any installed version of it.",
        override_usage = "pyproj install <WHEEL> [--install-base DIR] [--script-dir DIR]"
    )]
    Install(InstallArgs),
    #[command(
        about = "Remove every installed distribution with the given name.",
        override_usage = "pyproj uninstall <NAME> [--install-base DIR]"
    )]
    Uninstall(UninstallArgs),
    #[command(about = "List the public callables of a project's build backend.")]
    Hooks(ProjectArgs),
    #[command(about = "Show build, run and test dependencies of a project.")]
    Requires(ProjectArgs),
    #[command(about = "Show the core metadata reported by a project's build backend.")]
    Metadata(ProjectArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[arg(
        value_name = "PATH",
        value_parser = value_parser!(PathBuf),
        default_value = ".",
        help = "Project directories to build"
    )]
    pub paths: Vec<PathBuf>,
    #[arg(
        long,
        value_name = "DIR",
        value_parser = value_parser!(PathBuf),
        default_value = "build",
        help = "Scratch directory; each project gets a subdirectory"
    )]
    pub build_base: PathBuf,
    #[arg(
        long,
        value_name = "DIR",
        value_parser = value_parser!(PathBuf),
        default_value = "install",
        help = "Root of the installation"
    )]
    pub install_base: PathBuf,
    #[arg(long, help = "Install in editable mode, pointing back at the sources")]
    pub editable: bool,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    #[arg(value_name = "WHEEL", value_parser = value_parser!(PathBuf))]
    pub wheel: PathBuf,
    #[arg(
        long,
        value_name = "DIR",
        value_parser = value_parser!(PathBuf),
        default_value = "install",
        help = "Root of the installation"
    )]
    pub install_base: PathBuf,
    #[arg(
        long,
        value_name = "DIR",
        value_parser = value_parser!(PathBuf),
        help = "Launcher directory, relative to the install base"
    )]
    pub script_dir: Option<PathBuf>,
    #[arg(
        long,
        value_name = "DIR",
        value_parser = value_parser!(PathBuf),
        help = "Record an editable install pointing at this source tree"
    )]
    pub editable_source: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    #[arg(value_name = "NAME")]
    pub name: String,
    #[arg(
        long,
        value_name = "DIR",
        value_parser = value_parser!(PathBuf),
        default_value = "install",
        help = "Root of the installation"
    )]
    pub install_base: PathBuf,
}

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[arg(
        value_name = "PATH",
        value_parser = value_parser!(PathBuf),
        default_value = ".",
        help = "Project directory"
    )]
    pub path: PathBuf,
}

impl CommandCli {
    pub fn name(&self) -> &'static str {
        match self {
            CommandCli::Build(_) => "build",
            CommandCli::Install(_) => "install",
            CommandCli::Uninstall(_) => "uninstall",
            CommandCli::Hooks(_) => "hooks",
            CommandCli::Requires(_) => "requires",
            CommandCli::Metadata(_) => "metadata",
        }
    }
}
