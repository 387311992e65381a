//! Prompt templates: optional prefix/suffix wrapping applied at submission.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::JobStoreError;

/// A prompt template. The final prompt sent to the provider is
/// `"{prefix} {user_prompt} {suffix}"`, trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub prompt_prefix: Option<String>,
    pub prompt_suffix: Option<String>,
}

impl Template {
    /// Wrap a user prompt with this template.
    pub fn apply(&self, user_prompt: &str) -> String {
        format!(
            "{} {} {}",
            self.prompt_prefix.as_deref().unwrap_or(""),
            user_prompt,
            self.prompt_suffix.as_deref().unwrap_or(""),
        )
        .trim()
        .to_string()
    }
}

/// Template lookup abstraction.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get(&self, template_id: &str) -> Result<Option<Template>, JobStoreError>;
}

/// In-memory template store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<HashMap<String, Template>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn put(&self, template: Template) {
        self.templates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(template.id.clone(), template);
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn get(&self, template_id: &str) -> Result<Option<Template>, JobStoreError> {
        Ok(self
            .templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(template_id)
            .cloned())
    }
}

#[async_trait]
impl<T: TemplateStore + ?Sized> TemplateStore for Arc<T> {
    async fn get(&self, template_id: &str) -> Result<Option<Template>, JobStoreError> {
        (**self).get(template_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_trims_and_joins() {
        let tpl = Template {
            id: "cinematic".into(),
            prompt_prefix: Some("Cinematic shot of".into()),
            prompt_suffix: Some("at golden hour".into()),
        };
        assert_eq!(tpl.apply("a lighthouse"), "Cinematic shot of a lighthouse at golden hour");

        let bare = Template {
            id: "bare".into(),
            prompt_prefix: None,
            prompt_suffix: None,
        };
        assert_eq!(bare.apply("a lighthouse"), "a lighthouse");
    }
}
