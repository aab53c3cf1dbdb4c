use std::{
    collections::BTreeSet,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use pyproj_python::InstallationLayout;
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::hash_bytes;

pub(crate) fn layout_in(base: &Path) -> InstallationLayout {
    InstallationLayout::for_platform(base, "3.12").with_python("/usr/bin/python3")
}

/// Relative paths of every file and directory below `root`.
pub(crate) fn snapshot(root: &Path) -> BTreeSet<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect()
}

/// In-memory description of a wheel written with a correct RECORD.
pub(crate) struct WheelFixture {
    pub name: String,
    pub version: String,
    pub build_tag: Option<String>,
    pub wheel_version: String,
    pub root_is_purelib: bool,
    pub files: Vec<(String, Vec<u8>)>,
}

impl WheelFixture {
    pub(crate) fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            build_tag: None,
            wheel_version: "1.0".to_string(),
            root_is_purelib: true,
            files: Vec::new(),
        }
    }

    pub(crate) fn file(mut self, path: &str, contents: &str) -> Self {
        self.files.push((path.to_string(), contents.as_bytes().to_vec()));
        self
    }

    pub(crate) fn wheel_version(mut self, version: &str) -> Self {
        self.wheel_version = version.to_string();
        self
    }

    pub(crate) fn build_tag(mut self, tag: &str) -> Self {
        self.build_tag = Some(tag.to_string());
        self
    }

    pub(crate) fn platlib(mut self) -> Self {
        self.root_is_purelib = false;
        self
    }

    pub(crate) fn dist_info(&self) -> String {
        format!("{}-{}.dist-info", self.name, self.version)
    }

    pub(crate) fn write(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let build = self.build_tag.as_ref().map(|tag| format!("-{tag}")).unwrap_or_default();
        let path = dir.join(format!("{}-{}{build}-py3-none-any.whl", self.name, self.version));
        let mut zip = ZipWriter::new(File::create(&path)?);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let dist_info = self.dist_info();

        let mut members = self.files.clone();
        members.push((
            format!("{dist_info}/WHEEL"),
            format!(
                "Wheel-Version: {}\nGenerator: fixture\nRoot-Is-Purelib: {}\nTag: py3-none-any\n",
                self.wheel_version, self.root_is_purelib
            )
            .into_bytes(),
        ));
        members.push((
            format!("{dist_info}/METADATA"),
            format!("Metadata-Version: 2.1\nName: {}\nVersion: {}\n", self.name, self.version)
                .into_bytes(),
        ));

        let mut record = String::new();
        for (member, data) in &members {
            zip.start_file(member.as_str(), options)?;
            zip.write_all(data)?;
            record.push_str(&format!("{member},{},{}\n", hash_bytes(data), data.len()));
        }
        let record_path = format!("{dist_info}/RECORD");
        record.push_str(&format!("{record_path},,\n"));
        zip.start_file(record_path.as_str(), options)?;
        zip.write_all(record.as_bytes())?;
        zip.finish()?;
        Ok(path)
    }
}
