//! content-store - Directory-backed content storage
//!
//! Persists content objects (a metadata document, a primary content
//! document and any number of attached files) under integer ids, one
//! directory per id.
//!
//! # Guarantees
//!
//! - Ids are drawn at random from `[1, 2^32]` and checked against the
//!   store, with a bounded number of retries
//! - Creation is all-or-nothing: a failed create removes the directory
//!   it started
//! - Attached file paths can never address anything outside the
//!   content's own file area
//!
//! # Modules
//!
//! - `store`: ContentStore, the filesystem abstraction, path layout
//! - `domain`: ContentId, Permission, User
//! - `config`: Store settings from config file and environment
//! - `cli`: Operator command-line interface
//!
//! # Usage
//!
//! ```bash
//! content-store create --metadata h5p.json --content content.json
//! content-store attach 42 images/a.png ./a.png
//! content-store files 42
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use config::StoreSettings;
pub use domain::{ContentId, Permission, User};
pub use store::{ContentFileStream, ContentStore, FileSystem, LocalFileSystem, StoreError};
