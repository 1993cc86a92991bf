//! Reusable subject/body templates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Channel;
use crate::error::{UpkeepError, ValidationError};
use crate::id::TemplateId;
use crate::template;

/// A stored notification template for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    #[serde(default)]
    pub id: TemplateId,
    pub name: String,
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    /// Placeholder paths the template expects. Filled from the text when
    /// left empty.
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub is_html: bool,
}

impl NotificationTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>, channel: Channel, body: impl Into<String>) -> Self {
        let mut template = Self {
            id: TemplateId::new(),
            name: name.into(),
            channel,
            subject: None,
            body: body.into(),
            variables: Vec::new(),
            is_html: false,
        };
        template.fill_variables();
        template
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self.variables.clear();
        self.fill_variables();
        self
    }

    /// Populate `variables` from the placeholders in subject and body if
    /// none were declared.
    pub fn fill_variables(&mut self) {
        if !self.variables.is_empty() {
            return;
        }
        let text = format!("{} {}", self.subject.as_deref().unwrap_or_default(), self.body);
        self.variables = template::placeholders(&text);
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] for a blank name or body.
    pub fn validate(&self) -> Result<(), UpkeepError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.body.trim().is_empty() {
            return Err(ValidationError::MissingContent.into());
        }
        Ok(())
    }

    /// Render subject and body against `variables`.
    #[must_use]
    pub fn render(&self, variables: &Value) -> (Option<String>, String) {
        (
            self.subject.as_deref().map(|s| template::render(s, variables)),
            template::render(&self.body, variables),
        )
    }
}
