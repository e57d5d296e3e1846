use coachdeck_api::{ApiError, Result};

use super::{ActionDispatcher, ActionKey};
use crate::collaborators::{GenerationParams, TextGenerator};

impl ActionDispatcher {
    /// Generate text for `target` (e.g. a profile field or an email draft id).
    pub async fn generate_text(
        &self,
        generator: &dyn TextGenerator,
        target: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(ApiError::invalid_input("prompt is empty"));
        }
        let key = ActionKey::new("generate_text", target);
        self.dispatch(key, generator.complete(prompt, params)).await
    }
}
