use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum WheelError {
    #[error("invalid wheel file name '{0}'")]
    InvalidFilename(String),
    #[error("wheel format version '{0}' is not supported")]
    UnsupportedVersion(String),
    #[error("wheel is missing {0}")]
    MissingMember(String),
    #[error("unknown installation category '{category}' for {path}")]
    UnknownCategory { category: String, path: String },
    #[error("unsafe path '{0}' in wheel")]
    UnsafePath(String),
    #[error("cannot express {} as a file URL", .0.display())]
    InvalidSource(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

impl WheelError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Attach a path-bearing context message to an I/O result.
pub(crate) trait IoContext<T> {
    fn io_context(self, action: &str, path: &std::path::Path) -> Result<T, WheelError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, action: &str, path: &std::path::Path) -> Result<T, WheelError> {
        self.map_err(|err| WheelError::io(format!("failed to {action} {}", path.display()), err))
    }
}
