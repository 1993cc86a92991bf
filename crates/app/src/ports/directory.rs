//! Member directory port — expands group and role names into user ids.

use async_trait::async_trait;
use upkeep_domain::error::UpkeepError;

/// Resolves group and role membership for notification recipients.
///
/// Membership lives in the host application; the dispatcher only asks.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// User ids belonging to `group`. Unknown groups have no members.
    async fn group_members(&self, group: &str) -> Result<Vec<String>, UpkeepError>;

    /// User ids holding `role`. Unknown roles have no members.
    async fn role_members(&self, role: &str) -> Result<Vec<String>, UpkeepError>;
}

/// A directory with no groups and no roles.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDirectory;

#[async_trait]
impl MemberDirectory for EmptyDirectory {
    async fn group_members(&self, _group: &str) -> Result<Vec<String>, UpkeepError> {
        Ok(Vec::new())
    }

    async fn role_members(&self, _role: &str) -> Result<Vec<String>, UpkeepError> {
        Ok(Vec::new())
    }
}
