//! Wheel installation and removal against an installation layout.
//!
//! Installing always removes any previously installed distribution of the
//! same name first, so repeated installs converge on the same tree.

mod entry_points;
mod error;
mod filename;
mod install;
mod metadata;
mod record;
mod scripts;
mod uninstall;

pub use entry_points::{ConsoleScriptSpec, EntryPoints};
pub use error::WheelError;
pub use filename::WheelFilename;
pub use install::{install_wheel, InstallOptions, InstalledWheel, DEFAULT_INSTALLER};
pub use metadata::WheelMetadata;
pub use record::{append_record, hash_bytes, write_and_record, Record, RecordEntry};
pub use scripts::{script_filenames, write_console_script};
pub use uninstall::{remove_distributions, RemovalReport};

#[cfg(test)]
pub(crate) mod testing;
