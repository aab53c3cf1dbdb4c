use std::{fmt, str::FromStr};

use crate::WheelError;

/// `{distribution}-{version}[-{build}]-{python}-{abi}-{platform}.whl`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelFilename {
    pub distribution: String,
    pub version: String,
    pub build_tag: Option<String>,
    pub python_tag: String,
    pub abi_tag: String,
    pub platform_tag: String,
}

impl WheelFilename {
    pub fn parse(filename: &str) -> Result<Self, WheelError> {
        let stem = filename.strip_suffix(".whl").unwrap_or(filename);
        let parts: Vec<&str> = stem.split('-').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(WheelError::InvalidFilename(filename.to_string()));
        }
        let (build_tag, tags) = match parts.as_slice() {
            [_, _, python, abi, platform] => (None, [*python, *abi, *platform]),
            [_, _, build, python, abi, platform] => {
                (Some((*build).to_string()), [*python, *abi, *platform])
            }
            _ => return Err(WheelError::InvalidFilename(filename.to_string())),
        };
        Ok(Self {
            distribution: parts[0].to_string(),
            version: parts[1].to_string(),
            build_tag,
            python_tag: tags[0].to_string(),
            abi_tag: tags[1].to_string(),
            platform_tag: tags[2].to_string(),
        })
    }

    /// `{python}-{abi}-{platform}`
    pub fn compatibility_tag(&self) -> String {
        format!("{}-{}-{}", self.python_tag, self.abi_tag, self.platform_tag)
    }

    pub fn dist_info_dir(&self) -> String {
        format!("{}-{}.dist-info", self.distribution, self.version)
    }

    pub fn data_dir(&self) -> String {
        format!("{}-{}.data", self.distribution, self.version)
    }
}

impl FromStr for WheelFilename {
    type Err = WheelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for WheelFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.distribution, self.version)?;
        if let Some(build) = &self.build_tag {
            write!(f, "-{build}")?;
        }
        write!(f, "-{}.whl", self.compatibility_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_five_and_six_components() -> anyhow::Result<()> {
        let plain = WheelFilename::parse("pkg-1.0-py3-none-any.whl")?;
        assert_eq!(plain.distribution, "pkg");
        assert_eq!(plain.version, "1.0");
        assert_eq!(plain.build_tag, None);
        assert_eq!(plain.compatibility_tag(), "py3-none-any");
        assert_eq!(plain.dist_info_dir(), "pkg-1.0.dist-info");

        let built = WheelFilename::parse("pkg-1.0-1-py3-none-any.whl")?;
        assert_eq!(built.build_tag.as_deref(), Some("1"));
        assert_eq!(built.to_string(), "pkg-1.0-1-py3-none-any.whl");
        assert_eq!(built.data_dir(), "pkg-1.0.data");
        Ok(())
    }

    #[test]
    fn rejects_other_component_counts() {
        for name in ["pkg-1.0.whl", "a-b-c-d-e-f-g.whl", "a-b-c-d.whl", "pkg--py3-none-any.whl"] {
            assert!(
                matches!(
                    WheelFilename::parse(name),
                    Err(WheelError::InvalidFilename(_))
                ),
                "{name} should be rejected"
            );
        }
    }
}
