//! Permission reporting seam.
//!
//! The store never enforces permissions; it asks a [`PermissionPolicy`]
//! what a user may do and reports the answer.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::error::Result;
use crate::domain::{ContentId, Permission, User};

/// Decides the capability set a user holds over one content object
#[async_trait]
pub trait PermissionPolicy: Send + Sync {
    async fn permissions(&self, id: ContentId, user: &User) -> Result<BTreeSet<Permission>>;
}

/// Grants every permission to every user
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantAll;

#[async_trait]
impl PermissionPolicy for GrantAll {
    async fn permissions(&self, _id: ContentId, _user: &User) -> Result<BTreeSet<Permission>> {
        Ok(Permission::all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_all() {
        let user = User::new("u1", "Test User");
        let id = ContentId::new(1).unwrap();

        let granted = GrantAll.permissions(id, &user).await.unwrap();
        assert_eq!(granted, Permission::all());
    }
}
