//! A single, internally-consistent load of templates/categories/strategies.
//!
//! Building a whole new `Snapshot` before it is ever installed is what makes
//! the store's reload atomic: a reader never sees templates from the new
//! load paired with strategies from the old one.

use std::collections::HashMap;

use crate::collaborators::Loader;
use crate::error::{Result, SmsError};
use crate::model::{CategoryName, Channel, SmsCategory, SmsTemplate, StrategyRecord, TemplateName};

pub struct Snapshot {
    templates: HashMap<TemplateName, SmsTemplate>,
    categories: HashMap<CategoryName, SmsCategory>,
    /// Keyed by template name; a template with no strategies simply has no
    /// entry, matching the original's "absence means unrestricted".
    strategies: HashMap<TemplateName, Vec<StrategyRecord>>,
}

impl Snapshot {
    pub async fn build(loader: &dyn Loader) -> Result<Self> {
        let templates = loader
            .load_template()
            .await?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        let categories = loader
            .load_category()
            .await?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        let mut strategies: HashMap<TemplateName, Vec<StrategyRecord>> = HashMap::new();
        for record in loader.load_strategy().await? {
            strategies.entry(record.template.clone()).or_default().push(record);
        }

        Ok(Snapshot { templates, categories, strategies })
    }

    pub fn which_template(&self, name: &TemplateName) -> Result<SmsTemplate> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| SmsError::TemplateNotFound(name.clone()))?;
        if !template.is_usable() {
            return Err(SmsError::TemplateNotAvailable(name.clone()));
        }
        Ok(template.clone())
    }

    pub fn which_category(&self, name: &CategoryName) -> Result<SmsCategory> {
        self.categories
            .get(name)
            .cloned()
            .ok_or_else(|| SmsError::CategoryNotFound(name.0.clone()))
    }

    pub fn which_channel(&self, category: &CategoryName) -> Result<Channel> {
        self.which_category(category).map(|c| c.channel)
    }

    pub fn strategies_for(&self, template: &TemplateName) -> Vec<StrategyRecord> {
        self.strategies.get(template).cloned().unwrap_or_default()
    }

    /// Every loaded strategy record, flattened across templates — what
    /// [`crate::config::ConfigStore`] hands to [`crate::filter::FilterChain::apply_all`]
    /// on init and after each reload.
    pub fn all_strategies(&self) -> Vec<StrategyRecord> {
        self.strategies.values().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FakeLoader {
        templates: Vec<SmsTemplate>,
        categories: Vec<SmsCategory>,
        strategies: Vec<StrategyRecord>,
    }

    #[async_trait]
    impl Loader for FakeLoader {
        async fn load_template(&self) -> Result<Vec<SmsTemplate>> {
            Ok(self.templates.clone())
        }
        async fn load_category(&self) -> Result<Vec<SmsCategory>> {
            Ok(self.categories.clone())
        }
        async fn load_strategy(&self) -> Result<Vec<StrategyRecord>> {
            Ok(self.strategies.clone())
        }
    }

    fn sample_template(name: &str, enabled: bool) -> SmsTemplate {
        SmsTemplate {
            name: TemplateName::from(name),
            category: CategoryName::from("growth"),
            content: "hi {name}".to_string(),
            enabled,
            callback: String::new(),
            actions: vec![],
            description: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn disabled_template_is_not_available() {
        let loader = FakeLoader {
            templates: vec![sample_template("welcome", false)],
            categories: vec![],
            strategies: vec![],
        };
        let snapshot = Snapshot::build(&loader).await.unwrap();
        let err = snapshot.which_template(&TemplateName::from("welcome")).unwrap_err();
        assert!(matches!(err, SmsError::TemplateNotAvailable(_)));
    }

    #[tokio::test]
    async fn missing_template_is_not_found() {
        let loader = FakeLoader { templates: vec![], categories: vec![], strategies: vec![] };
        let snapshot = Snapshot::build(&loader).await.unwrap();
        let err = snapshot.which_template(&TemplateName::from("ghost")).unwrap_err();
        assert!(matches!(err, SmsError::TemplateNotFound(_)));
    }

    #[tokio::test]
    async fn strategies_are_grouped_by_template() {
        let loader = FakeLoader {
            templates: vec![],
            categories: vec![],
            strategies: vec![
                StrategyRecord {
                    strategy_type: crate::model::StrategyType::RateLimit,
                    template: TemplateName::from("welcome"),
                    expression: "10/1h".to_string(),
                    enabled: true,
                },
                StrategyRecord {
                    strategy_type: crate::model::StrategyType::Unsubscribe,
                    template: TemplateName::from("welcome"),
                    expression: "".to_string(),
                    enabled: true,
                },
            ],
        };
        let snapshot = Snapshot::build(&loader).await.unwrap();
        assert_eq!(snapshot.strategies_for(&TemplateName::from("welcome")).len(), 2);
        assert!(snapshot.strategies_for(&TemplateName::from("other")).is_empty());
    }
}
