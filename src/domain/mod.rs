//! Domain types for the content store.
//!
//! - ContentId: integer identifier of a content object
//! - Permission: capabilities a user holds over a content object
//! - User: the acting user forwarded through operations

pub mod content_id;
pub mod permission;
pub mod user;

pub use content_id::{ContentId, InvalidContentId, MAX_CONTENT_ID};
pub use permission::Permission;
pub use user::User;
