//! Capabilities a user can hold over a content object.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A named capability over one content object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read the content
    View,

    /// Modify the content
    Edit,

    /// Remove the content
    Delete,

    /// Export the content as a package
    Download,

    /// Embed the content elsewhere
    Embed,
}

impl Permission {
    /// Every permission, in declaration order
    pub const ALL: [Permission; 5] = [
        Permission::View,
        Permission::Edit,
        Permission::Delete,
        Permission::Download,
        Permission::Embed,
    ];

    /// The full capability set
    pub fn all() -> BTreeSet<Permission> {
        Self::ALL.into_iter().collect()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::View => write!(f, "view"),
            Permission::Edit => write!(f, "edit"),
            Permission::Delete => write!(f, "delete"),
            Permission::Download => write!(f, "download"),
            Permission::Embed => write!(f, "embed"),
        }
    }
}
