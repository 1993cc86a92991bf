//! Template catalog — CRUD for [`NotificationTemplate`]s.

use std::sync::Arc;

use upkeep_domain::error::{NotFoundError, UpkeepError, ValidationError};
use upkeep_domain::id::TemplateId;
use upkeep_domain::notification::NotificationTemplate;

use crate::collection::Collection;
use crate::ports::KeyValueStore;

pub const COLLECTION_KEY: &str = "notification_templates";

fn not_found(id: TemplateId) -> UpkeepError {
    NotFoundError {
        entity: "NotificationTemplate",
        id: id.to_string(),
    }
    .into()
}

pub struct TemplateService<S> {
    templates: Collection<S, NotificationTemplate>,
}

impl<S: KeyValueStore + Send + Sync> TemplateService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            templates: Collection::new(store, COLLECTION_KEY),
        }
    }

    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn load(&self) -> Result<usize, UpkeepError> {
        self.templates.load().await
    }

    /// Store a new template. Declared variables are derived from the text
    /// when none are given.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] for a blank name or body or a
    /// taken id, or a storage error.
    #[tracing::instrument(skip(self, template), fields(template_name = %template.name))]
    pub async fn create_template(
        &self,
        mut template: NotificationTemplate,
    ) -> Result<NotificationTemplate, UpkeepError> {
        template.validate()?;
        template.fill_variables();
        self.templates
            .mutate(|templates| {
                if templates.iter().any(|t| t.id == template.id) {
                    return Err(ValidationError::AlreadyExists(template.id.to_string()).into());
                }
                templates.push(template.clone());
                Ok(template)
            })
            .await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] when no template with `id` exists.
    pub async fn get_template(&self, id: TemplateId) -> Result<NotificationTemplate, UpkeepError> {
        self.templates.find(|t| t.id == id).await.ok_or_else(|| not_found(id))
    }

    pub async fn list_templates(&self) -> Vec<NotificationTemplate> {
        self.templates.all().await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`], [`UpkeepError::NotFound`] or a
    /// storage error.
    #[tracing::instrument(skip(self, template), fields(template_id = %template.id))]
    pub async fn update_template(
        &self,
        mut template: NotificationTemplate,
    ) -> Result<NotificationTemplate, UpkeepError> {
        template.validate()?;
        template.fill_variables();
        self.templates
            .mutate(|templates| {
                let slot = templates
                    .iter_mut()
                    .find(|t| t.id == template.id)
                    .ok_or_else(|| not_found(template.id))?;
                *slot = template.clone();
                Ok(template)
            })
            .await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_template(&self, id: TemplateId) -> Result<(), UpkeepError> {
        self.templates
            .mutate(|templates| {
                let before = templates.len();
                templates.retain(|t| t.id != id);
                if templates.len() == before {
                    return Err(not_found(id));
                }
                Ok(())
            })
            .await
    }
}
