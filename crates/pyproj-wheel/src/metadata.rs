use pyproj_domain::CoreMetadata;
use serde::{Deserialize, Serialize};

use crate::{WheelError, WheelFilename};

/// Facts from a wheel's filename and its `WHEEL` header block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelMetadata {
    pub distribution: String,
    pub version: String,
    pub build_tag: Option<String>,
    pub compatibility_tags: String,
    pub wheel_format_major: u32,
    pub wheel_format_minor: u32,
    pub root_is_purelib: bool,
}

impl WheelMetadata {
    /// Parse `WHEEL`, enforcing the format-version gate.
    ///
    /// Returns the metadata plus a compatibility warning when the minor
    /// version is newer than 0.
    pub fn from_wheel_file(
        filename: &WheelFilename,
        text: &str,
    ) -> Result<(Self, Option<String>), WheelError> {
        let headers = CoreMetadata::parse(text);
        let raw_version = headers.get("Wheel-Version").unwrap_or_default();
        let (major, minor) = parse_format_version(raw_version)
            .ok_or_else(|| WheelError::UnsupportedVersion(raw_version.to_string()))?;
        if major != 1 {
            return Err(WheelError::UnsupportedVersion(raw_version.to_string()));
        }
        let warning = (minor != 0).then(|| {
            format!(
                "wheel format {raw_version} of {} is newer than supported version 1.0",
                filename.distribution
            )
        });

        let tags = headers.get_all("Tag");
        let compatibility_tags = if tags.is_empty() {
            filename.compatibility_tag()
        } else {
            tags.join(".")
        };

        Ok((
            Self {
                distribution: filename.distribution.clone(),
                version: filename.version.clone(),
                build_tag: filename.build_tag.clone(),
                compatibility_tags,
                wheel_format_major: major,
                wheel_format_minor: minor,
                root_is_purelib: headers.get("Root-Is-Purelib") == Some("true"),
            },
            warning,
        ))
    }
}

fn parse_format_version(raw: &str) -> Option<(u32, u32)> {
    let mut parts = raw.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}
