//! Layout of a content directory and validation of attached file paths.
//!
//! ```text
//! <root>/<id>/h5p.json               # metadata document
//! <root>/<id>/content/content.json   # primary content document
//! <root>/<id>/content/<...>          # attached files
//! ```

use std::path::{Path, PathBuf};

use super::error::{Result, StoreError};
use crate::domain::ContentId;

/// Metadata document name, directly under the content directory
pub const METADATA_FILE: &str = "h5p.json";

/// Name of the file area under the content directory
pub const FILE_AREA_DIR: &str = "content";

/// Primary content document name, directly under the file area
pub const PARAMETERS_FILE: &str = "content.json";

const UPLOAD_PREFIX: &str = ".upload-";
const UPLOAD_SUFFIX: &str = ".partial";

/// Glob (relative to the file area) matching in-flight uploads
pub const UPLOAD_GLOB: &str = "**/.upload-*.partial";

/// Resolves on-disk locations for content ids under one root
#[derive(Debug, Clone)]
pub struct ContentLayout {
    root: PathBuf,
}

impl ContentLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<id>`
    pub fn content_dir(&self, id: ContentId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// `<root>/<id>/h5p.json`
    pub fn metadata_path(&self, id: ContentId) -> PathBuf {
        self.content_dir(id).join(METADATA_FILE)
    }

    /// `<root>/<id>/content`
    pub fn file_area(&self, id: ContentId) -> PathBuf {
        self.content_dir(id).join(FILE_AREA_DIR)
    }

    /// `<root>/<id>/content/content.json`
    pub fn parameters_path(&self, id: ContentId) -> PathBuf {
        self.file_area(id).join(PARAMETERS_FILE)
    }

    /// Absolute location of an attached file
    pub fn file_path(&self, id: ContentId, file: &FilePath) -> PathBuf {
        self.file_area(id).join(file.to_path_buf())
    }

    /// Temporary sibling a file is streamed into before it is renamed into place
    pub fn upload_path(&self, id: ContentId, file: &FilePath, nonce: &str) -> PathBuf {
        let target = self.file_path(id, file);
        let name = format!("{UPLOAD_PREFIX}{nonce}{UPLOAD_SUFFIX}");
        match target.parent() {
            Some(parent) => parent.join(name),
            None => self.file_area(id).join(name),
        }
    }
}

/// A normalized path inside a content's file area.
///
/// Built only through [`FilePath::parse`], which resolves `.` and `..`
/// segments and rejects anything that would leave the file area.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePath {
    segments: Vec<String>,
}

impl FilePath {
    /// Normalize a caller-supplied relative path.
    ///
    /// Both `/` and `\` separate segments. Absolute paths, drive prefixes,
    /// NUL bytes and `..` segments that climb above the file area are
    /// rejected with [`StoreError::PathTraversal`].
    pub fn parse(raw: &str) -> Result<Self> {
        let traversal = || StoreError::PathTraversal(raw.to_string());

        if raw.starts_with('/')
            || raw.starts_with('\\')
            || raw.contains('\0')
            || has_drive_prefix(raw)
        {
            return Err(traversal());
        }

        let mut segments: Vec<String> = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(traversal());
                    }
                }
                s => segments.push(s.to_string()),
            }
        }

        if segments.is_empty() {
            return Err(traversal());
        }

        Ok(Self { segments })
    }

    /// `/`-separated form, as reported by file listings
    pub fn as_string(&self) -> String {
        self.segments.join("/")
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// True for the primary content document and for upload temp names
    pub fn is_reserved(&self) -> bool {
        if self.segments.len() == 1 && self.segments[0] == PARAMETERS_FILE {
            return true;
        }
        self.segments
            .last()
            .is_some_and(|name| name.starts_with(UPLOAD_PREFIX) && name.ends_with(UPLOAD_SUFFIX))
    }
}

/// `C:` or `C:/...`, which Windows resolves outside the file area
fn has_drive_prefix(raw: &str) -> bool {
    match raw.as_bytes() {
        [letter, b':'] => letter.is_ascii_alphabetic(),
        [letter, b':', b'/' | b'\\', ..] => letter.is_ascii_alphabetic(),
        _ => false,
    }
}

impl std::fmt::Display for FilePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}
