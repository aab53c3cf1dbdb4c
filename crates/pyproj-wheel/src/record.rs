use std::{
    collections::HashMap,
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::IoContext;
use crate::WheelError;

const LINE_SEPARATOR: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// One `path,hash,size` line of a RECORD manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub path: String,
    pub hash: Option<String>,
    pub size: Option<u64>,
}

impl RecordEntry {
    /// Entry without hash or size, as used for generated launchers.
    pub fn unhashed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hash: None,
            size: None,
        }
    }

    /// Lines without a comma are not entries.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.contains(',') {
            return None;
        }
        let fields: Vec<&str> = line.rsplitn(3, ',').collect();
        let (path, hash, size) = match fields.as_slice() {
            [size, hash, path] => (*path, *hash, *size),
            [hash, path] => (*path, *hash, ""),
            _ => return None,
        };
        Some(Self {
            path: path.to_string(),
            hash: Some(hash.trim().to_string()).filter(|value| !value.is_empty()),
            size: size.trim().parse().ok(),
        })
    }
}

impl fmt::Display for RecordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},", self.path, self.hash.as_deref().unwrap_or_default())?;
        if let Some(size) = self.size {
            write!(f, "{size}")?;
        }
        Ok(())
    }
}

/// Ordered manifest with unique paths.
#[derive(Debug, Clone, Default)]
pub struct Record {
    entries: Vec<RecordEntry>,
    /// Position of each path in `entries`. `None` after `entries_mut`.
    positions: Option<HashMap<String, usize>>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Record {}

impl Record {
    pub fn parse(text: &str) -> Self {
        let mut record = Self::default();
        for entry in text.lines().filter_map(RecordEntry::parse_line) {
            record.push(entry);
        }
        record
    }

    pub fn read(path: &Path) -> Result<Self, WheelError> {
        let text = fs::read_to_string(path).io_context("read", path)?;
        Ok(Self::parse(&text))
    }

    /// Append `entry`, replacing an earlier entry for the same path in place.
    pub fn push(&mut self, entry: RecordEntry) {
        let entries = &self.entries;
        let positions = self.positions.get_or_insert_with(|| {
            entries
                .iter()
                .enumerate()
                .map(|(index, known)| (known.path.clone(), index))
                .collect()
        });
        match positions.get(&entry.path).copied() {
            Some(index) => self.entries[index] = entry,
            None => {
                positions.insert(entry.path.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    /// Paths may be rewritten; the position index is rebuilt on the next push.
    pub fn entries_mut(&mut self) -> &mut [RecordEntry] {
        self.positions = None;
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write(&self, path: &Path) -> Result<(), WheelError> {
        fs::write(path, self.to_string()).io_context("write", path)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// `sha256=<urlsafe base64 without padding>`
pub fn hash_bytes(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    format!("sha256={}", URL_SAFE_NO_PAD.encode(digest))
}

/// Write `lines` (platform line endings, trailing newline) to `path` under
/// `libdir` and return the matching RECORD entry.
pub fn write_and_record<S: AsRef<str>>(
    libdir: &Path,
    path: impl AsRef<Path>,
    lines: &[S],
) -> Result<RecordEntry, WheelError> {
    let target = libdir.join(path.as_ref());
    let mut raw = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(LINE_SEPARATOR);
    raw.push_str(LINE_SEPARATOR);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).io_context("create", parent)?;
    }
    fs::write(&target, raw.as_bytes()).io_context("write", &target)?;
    Ok(RecordEntry {
        path: record_path(&target, libdir),
        hash: Some(hash_bytes(raw.as_bytes())),
        size: Some(raw.len() as u64),
    })
}

/// Add entries to the RECORD of an installed distribution.
pub fn append_record(
    dist_info: &Path,
    entries: impl IntoIterator<Item = RecordEntry>,
) -> Result<(), WheelError> {
    let path = dist_info.join("RECORD");
    let mut record = match Record::read(&path) {
        Ok(record) => record,
        Err(WheelError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
            Record::default()
        }
        Err(err) => return Err(err),
    };
    for entry in entries {
        record.push(entry);
    }
    record.write(&path)
}

/// Forward-slash path of `target` relative to `libdir`.
pub(crate) fn record_path(target: &Path, libdir: &Path) -> String {
    let relative: PathBuf =
        pathdiff::diff_paths(target, libdir).unwrap_or_else(|| target.to_path_buf());
    relative.to_string_lossy().replace('\\', "/")
}
