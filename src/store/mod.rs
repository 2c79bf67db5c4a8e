//! Directory-backed content storage.
//!
//! # Storage Layout
//!
//! ```text
//! <root>/
//! └── <content_id>/             # decimal id in [1, 2^32]
//!     ├── h5p.json              # metadata document
//!     └── content/
//!         ├── content.json      # primary content document
//!         └── images/a.png      # attached files, arbitrary relative paths
//! ```

pub mod content_store;
pub mod error;
pub mod fs;
pub mod paths;
pub mod permissions;

pub use content_store::{ContentFileStream, ContentStore};
pub use error::{Result, StoreError};
pub use fs::{ByteReader, ByteWriter, FileStats, FileSystem, LocalFileSystem};
pub use paths::{ContentLayout, FilePath};
pub use permissions::{GrantAll, PermissionPolicy};
