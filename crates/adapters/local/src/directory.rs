//! Static member directory.

use std::collections::HashMap;

use async_trait::async_trait;

use upkeep_app::ports::MemberDirectory;
use upkeep_domain::error::UpkeepError;

/// Group and role membership fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    groups: HashMap<String, Vec<String>>,
    roles: HashMap<String, Vec<String>>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new(groups: HashMap<String, Vec<String>>, roles: HashMap<String, Vec<String>>) -> Self {
        Self { groups, roles }
    }

    #[must_use]
    pub fn with_group<I, S>(mut self, group: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(group.into(), members.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_role<I, S>(mut self, role: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles
            .insert(role.into(), members.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl MemberDirectory for StaticDirectory {
    async fn group_members(&self, group: &str) -> Result<Vec<String>, UpkeepError> {
        Ok(self.groups.get(group).cloned().unwrap_or_default())
    }

    async fn role_members(&self, role: &str) -> Result<Vec<String>, UpkeepError> {
        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }
}
