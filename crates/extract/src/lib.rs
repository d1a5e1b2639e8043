pub mod llm;
pub mod normalizer;
pub mod prompt;
pub mod retry;
pub mod schema;

pub use llm::{GenerationParams, LanguageModel, build_language_model};
#[cfg(any(test, feature = "testing"))]
pub use llm::ScriptedModel;
pub use normalizer::{entity_id, relation_type, same_name, strip_code_fence};
pub use schema::{EntityCandidate, EntityType, ExtractionResult, RelationshipCandidate};

use common::Degradation;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Extraction output plus the reason it came back empty, if it degraded.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub result: ExtractionResult,
    pub degraded: Option<Degradation>,
}

/// Turns free text into entity/relationship candidates through the LLM.
///
/// Never fails: a provider error or unparseable output yields an empty
/// result and a [`Degradation`] describing why.
#[derive(Clone)]
pub struct EntityExtractor {
    llm: Arc<dyn LanguageModel>,
    params: GenerationParams,
}

impl EntityExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            params: GenerationParams::default(),
        }
    }

    pub async fn extract(&self, text: &str) -> ExtractionResult {
        self.extract_checked(text).await.result
    }

    pub async fn extract_checked(&self, text: &str) -> Extraction {
        if text.trim().is_empty() {
            return Extraction::default();
        }

        let prompt = prompt::build_extraction_prompt(text);
        let response = match self
            .llm
            .generate_response(&prompt, prompt::EXTRACTION_SYSTEM_PROMPT, &self.params)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Error extracting entities");
                return Extraction {
                    result: ExtractionResult::default(),
                    degraded: Some(Degradation::new("entity_extraction", e)),
                };
            }
        };

        let cleaned = strip_code_fence(&response);
        match serde_json::from_str::<ExtractionResult>(&cleaned) {
            Ok(result) => {
                debug!(
                    entities = result.entities.len(),
                    relationships = result.relationships.len(),
                    "Extracted candidates"
                );
                Extraction {
                    result,
                    degraded: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse entity extraction response");
                Extraction {
                    result: ExtractionResult::default(),
                    degraded: Some(Degradation::new("entity_extraction_parse", e)),
                }
            }
        }
    }
}
