use std::fs;

use anyhow::{Context, Result};
use pyproj_domain::CoreMetadata;
use tempfile::TempDir;
use tracing::debug;

use crate::hooks::{HookCaller, HookCallerExt};

/// Ask the backend for its core metadata through
/// `prepare_metadata_for_build_wheel` and parse the resulting `METADATA`.
pub async fn load_metadata(caller: &dyn HookCaller) -> Result<CoreMetadata> {
    let scratch = TempDir::new().context("failed to create metadata directory")?;
    let dist_info = caller
        .prepare_metadata_for_build_wheel(scratch.path(), None)
        .await?;
    let path = scratch.path().join(&dist_info).join("METADATA");
    debug!(backend = caller.backend_name(), path = %path.display(), "reading core metadata");
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(CoreMetadata::parse(&text))
}
