use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// A registered (provider, model) pair.
///
/// The id is derived as `"{provider_id}-{model_id}"`, so a pair can only be
/// registered once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmModel {
    pub id: String,
    pub provider_id: String,
    pub model_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl LlmModel {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        let provider_id = provider_id.into();
        let model_id = model_id.into();
        Self {
            id: Self::derive_id(&provider_id, &model_id),
            provider_id,
            model_id,
            enabled: true,
        }
    }

    pub fn derive_id(provider_id: &str, model_id: &str) -> String {
        format!("{provider_id}-{model_id}")
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelsModel {
    models: Vec<LlmModel>,
}

impl ModelsModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the pair is already registered.
    pub fn add_model(&mut self, model: LlmModel) -> bool {
        if self.find_pair(&model.provider_id, &model.model_id).is_some() {
            return false;
        }
        self.models.push(model);
        true
    }

    pub fn update_model(&mut self, updated: LlmModel) -> bool {
        if let Some(model) = self.models.iter_mut().find(|m| m.id == updated.id) {
            *model = updated;
            true
        } else {
            false
        }
    }

    pub fn delete_model(&mut self, id: &str) -> bool {
        let initial_len = self.models.len();
        self.models.retain(|m| m.id != id);
        self.models.len() < initial_len
    }

    pub fn get_model(&self, id: &str) -> Option<&LlmModel> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn find_pair(&self, provider_id: &str, model_id: &str) -> Option<&LlmModel> {
        self.models
            .iter()
            .find(|m| m.provider_id == provider_id && m.model_id == model_id)
    }

    pub fn models(&self) -> &[LlmModel] {
        &self.models
    }

    pub fn models_by_provider(&self, provider_id: &str) -> Vec<&LlmModel> {
        self.models
            .iter()
            .filter(|m| m.provider_id == provider_id)
            .collect()
    }

    /// Replace all models (used when loading from disk)
    pub fn replace_all(&mut self, models: Vec<LlmModel>) {
        self.models = models;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_id() {
        let model = LlmModel::new("openai", "gpt-4o");
        assert_eq!(model.id, "openai-gpt-4o");
        assert!(model.enabled);
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let mut models = ModelsModel::new();
        assert!(models.add_model(LlmModel::new("openai", "gpt-4o")));
        assert!(!models.add_model(LlmModel::new("openai", "gpt-4o")));
        assert!(models.add_model(LlmModel::new("groq", "gpt-4o")));
        assert_eq!(models.models().len(), 2);
        assert_eq!(models.models_by_provider("openai").len(), 1);
    }

    #[test]
    fn test_update_and_delete() {
        let mut models = ModelsModel::new();
        models.add_model(LlmModel::new("p", "m"));
        let mut disabled = LlmModel::new("p", "m");
        disabled.enabled = false;
        assert!(models.update_model(disabled));
        assert!(!models.get_model("p-m").unwrap().enabled);
        assert!(models.delete_model("p-m"));
        assert!(models.find_pair("p", "m").is_none());
    }
}
