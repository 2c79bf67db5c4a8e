//! The acting user passed through store operations.

use serde::{Deserialize, Serialize};

/// User on whose behalf an operation runs.
///
/// The store never authenticates; it only forwards the user to the
/// permission policy and to log spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier
    pub id: String,

    /// Display name
    pub name: String,
}

impl User {
    /// Create a user with the given id and name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
