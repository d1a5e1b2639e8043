use common::{Degradation, RagError, RagSettings, Result};
use extract::{GenerationParams, LanguageModel, strip_code_fence};
use futures::FutureExt;
use index::{GraphStore, PayloadFilter, VectorIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::strategy::{RetrievalOptions, RetrievalStrategy};

pub const SYSTEM_PROMPT: &str = r#"You are a precise and helpful assistant.
You must answer the user's question ONLY using the provided context facts.
Do not use outside knowledge.
If the facts do not contain the answer, state that you cannot answer based on the available information.

Your output must be a valid JSON object with exactly two keys:
1. "facts": A list of strings, where each string is a specific fact from the context used to answer the question.
2. "answer": A string containing the final answer.

Example format:
{
  "facts": ["GraphRAG is a method...", "It uses knowledge graphs..."],
  "answer": "GraphRAG is a method that uses knowledge graphs..."
}
"#;

pub const NO_CONTEXT_ANSWER: &str =
    "I could not find any relevant information in the knowledge base to answer your question.";

pub const UNEXPECTED_ERROR_ANSWER: &str = "An unexpected system error occurred.";

/// The grounded answer returned to callers. Always has both keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub facts: Vec<String>,
    pub answer: String,
}

impl AnswerResult {
    pub fn without_facts(answer: impl Into<String>) -> Self {
        Self {
            facts: Vec::new(),
            answer: answer.into(),
        }
    }

    pub fn from_error(err: &RagError) -> Self {
        Self::without_facts(format!(
            "An error occurred while processing your request: {}",
            err
        ))
    }
}

/// Per-call overrides for `ask`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AskOptions {
    /// Prepended to the built-in grounding instructions
    pub system_prompt: Option<String>,
    /// `None` uses the graph when it is available
    pub use_graph: Option<bool>,
    pub generation: Option<GenerationParams>,
    /// `"vector_only"` or `"hybrid"`; defaults to the configured strategy
    pub strategy: Option<String>,
    pub filter: Option<PayloadFilter>,
}

/// An answer plus every failure that was absorbed on the way.
#[derive(Debug, Clone, Default)]
pub struct AskOutcome {
    pub result: AnswerResult,
    pub degraded: Vec<Degradation>,
}

#[derive(Clone)]
pub struct AnswerPipeline {
    llm: Arc<dyn LanguageModel>,
    vector: Arc<dyn VectorIndex>,
    graph: Arc<GraphStore>,
    settings: RagSettings,
}

impl AnswerPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        vector: Arc<dyn VectorIndex>,
        graph: Arc<GraphStore>,
        settings: RagSettings,
    ) -> Self {
        Self {
            llm,
            vector,
            graph,
            settings,
        }
    }

    /// Answer `question` from the knowledge base. Never fails: errors are
    /// reported in the `answer` text.
    pub async fn ask(&self, question: &str, options: &AskOptions) -> AnswerResult {
        self.ask_detailed(question, options).await.result
    }

    pub async fn ask_detailed(&self, question: &str, options: &AskOptions) -> AskOutcome {
        match AssertUnwindSafe(self.try_ask(question, options))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(error = %e, kind = e.kind(), "Ragforge error");
                AskOutcome {
                    result: AnswerResult::from_error(&e),
                    degraded: Vec::new(),
                }
            }
            Err(_) => {
                error!("Unexpected error in ask");
                AskOutcome {
                    result: AnswerResult::without_facts(UNEXPECTED_ERROR_ANSWER),
                    degraded: Vec::new(),
                }
            }
        }
    }

    async fn try_ask(&self, question: &str, options: &AskOptions) -> Result<AskOutcome> {
        let use_graph = options
            .use_graph
            .unwrap_or_else(|| self.graph.is_available());
        let strategy = RetrievalStrategy::from_name(
            options
                .strategy
                .as_deref()
                .unwrap_or(&self.settings.default_strategy),
        );

        let retrieval = strategy
            .retrieve(
                question,
                self.vector.as_ref(),
                use_graph.then_some(self.graph.as_ref()),
                &RetrievalOptions {
                    limit: self.settings.max_context_chunks,
                    max_entities: self.settings.max_graph_entities,
                    filter: options.filter.clone(),
                },
            )
            .await?;

        let mut degraded: Vec<Degradation> = retrieval.degraded.into_iter().collect();

        if retrieval.snippets.is_empty() {
            return Ok(AskOutcome {
                result: AnswerResult::without_facts(NO_CONTEXT_ANSWER),
                degraded,
            });
        }

        info!(
            strategy = strategy.name(),
            snippets = retrieval.snippets.len(),
            "Retrieved context"
        );

        let prompt = build_prompt(&retrieval.snippets, question);
        let system_prompt = match options.system_prompt.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => format!("{}\n\n{}", custom, SYSTEM_PROMPT),
            _ => SYSTEM_PROMPT.to_string(),
        };
        let params = options.generation.unwrap_or_default();

        let raw_response = self
            .llm
            .generate_response(&prompt, &system_prompt, &params)
            .await?;

        let result = match parse_answer(&raw_response) {
            Ok(result) => result,
            Err(reason) => {
                error!(reason = %reason, response = %raw_response, "Failed to parse LLM response");
                degraded.push(Degradation::new("answer_parse", reason));
                AnswerResult::without_facts(raw_response)
            }
        };

        Ok(AskOutcome { result, degraded })
    }
}

/// Grounded prompt: the snippets as a bullet list, then the question.
pub fn build_prompt(snippets: &[String], question: &str) -> String {
    let context = snippets
        .iter()
        .map(|s| format!("- {}", s))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Context:\n{}\n\nQuestion:\n{}\n\nAnswer (in JSON):",
        context, question
    )
}

/// Parse the `{facts, answer}` object. Both keys must be present.
pub fn parse_answer(raw: &str) -> std::result::Result<AnswerResult, String> {
    let cleaned = strip_code_fence(raw);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| e.to_string())?;
    let object = value
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;

    let (Some(facts), Some(answer)) = (object.get("facts"), object.get("answer")) else {
        return Err("Missing required keys in JSON response".to_string());
    };

    let facts = match facts {
        Value::Array(items) => items.iter().map(value_to_text).collect(),
        Value::Null => Vec::new(),
        other => {
            warn!("facts is not a list, wrapping it");
            vec![value_to_text(other)]
        }
    };

    Ok(AnswerResult {
        facts,
        answer: value_to_text(answer),
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use extract::{EntityExtractor, ScriptedModel};
    use index::{HashingEmbedder, MemoryGraph, MemoryIndex};

    const EXTRACTION: &str = r#"{
        "entities": [
            {"name": "Shivaji", "type": "PERSON"},
            {"name": "Shivneri fort", "type": "LOCATION"}
        ],
        "relationships": [
            {"source": "Shivaji", "target": "Shivneri fort", "type": "BORN_IN", "description": "birthplace"}
        ]
    }"#;

    fn memory_vector() -> Arc<MemoryIndex> {
        Arc::new(MemoryIndex::new(Arc::new(HashingEmbedder::new(128))))
    }

    fn pipeline(model: Arc<ScriptedModel>, vector: Arc<dyn VectorIndex>) -> AnswerPipeline {
        AnswerPipeline::new(
            model,
            vector,
            Arc::new(GraphStore::unconfigured()),
            RagSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_store_cannot_answer_without_llm_call() {
        let model = Arc::new(ScriptedModel::constant("unused"));
        let pipeline = pipeline(model.clone(), memory_vector());

        let result = pipeline.ask("anything", &AskOptions::default()).await;
        assert_eq!(result, AnswerResult::without_facts(NO_CONTEXT_ANSWER));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_returns_raw_text() {
        let vector = memory_vector();
        vector
            .add_texts(&["Shivaji was born in Shivneri fort.".to_string()], None, None)
            .await
            .unwrap();
        let pipeline = pipeline(Arc::new(ScriptedModel::constant("not json")), vector);

        let outcome = pipeline
            .ask_detailed("Where was Shivaji born?", &AskOptions::default())
            .await;
        assert_eq!(outcome.result, AnswerResult::without_facts("not json"));
        assert_eq!(outcome.degraded[0].stage, "answer_parse");
    }

    #[tokio::test]
    async fn test_grounded_answer_is_parsed_from_fenced_json() {
        let vector = memory_vector();
        vector
            .add_texts(&["Shivaji was born in Shivneri fort.".to_string()], None, None)
            .await
            .unwrap();
        let model = Arc::new(ScriptedModel::constant(
            "```json\n{\"facts\": [\"Shivaji was born in Shivneri fort.\"], \"answer\": \"Shivneri fort\"}\n```",
        ));
        let pipeline = pipeline(model.clone(), vector);

        let result = pipeline
            .ask("Where was Shivaji born?", &AskOptions::default())
            .await;
        assert_eq!(result.answer, "Shivneri fort");
        assert_eq!(result.facts.len(), 1);

        let prompt = &model.prompts()[0];
        assert!(prompt.starts_with("Context:\n- Shivaji was born in Shivneri fort."));
        assert!(prompt.ends_with("Question:\nWhere was Shivaji born?\n\nAnswer (in JSON):"));
    }

    #[tokio::test]
    async fn test_custom_system_prompt_is_prepended() {
        let vector = memory_vector();
        vector.add_texts(&["a fact".to_string()], None, None).await.unwrap();
        let model = Arc::new(ScriptedModel::new(|_, system| {
            assert!(system.starts_with("Answer like a pirate.\n\n"));
            assert!(system.ends_with(SYSTEM_PROMPT));
            Ok(r#"{"facts": [], "answer": "arr"}"#.to_string())
        }));
        let pipeline = pipeline(model, vector);

        let options = AskOptions {
            system_prompt: Some("Answer like a pirate.".to_string()),
            ..AskOptions::default()
        };
        assert_eq!(pipeline.ask("fact?", &options).await.answer, "arr");
    }

    #[tokio::test]
    async fn test_provider_error_is_reported_in_answer() {
        let vector = memory_vector();
        vector.add_texts(&["a fact".to_string()], None, None).await.unwrap();
        let pipeline = pipeline(Arc::new(ScriptedModel::failing("quota exceeded")), vector);

        let result = pipeline.ask("fact?", &AskOptions::default()).await;
        assert!(result.facts.is_empty());
        assert_eq!(
            result.answer,
            "An error occurred while processing your request: Provider error: quota exceeded"
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_unexpected_error() {
        let vector = memory_vector();
        vector.add_texts(&["a fact".to_string()], None, None).await.unwrap();
        let model = Arc::new(ScriptedModel::new(|_, _| panic!("boom")));
        let pipeline = pipeline(model, vector);

        let result = pipeline.ask("fact?", &AskOptions::default()).await;
        assert_eq!(result, AnswerResult::without_facts(UNEXPECTED_ERROR_ANSWER));
    }

    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn add_texts(
            &self,
            _: &[String],
            _: Option<&[common::Metadata]>,
            _: Option<&[String]>,
        ) -> Result<Vec<String>> {
            Err(RagError::ingestion("down"))
        }
        async fn search(&self, _: &str, _: usize, _: Option<&PayloadFilter>) -> Result<Vec<String>> {
            Err(RagError::retrieval("down"))
        }
        async fn delete(&self, _: &[String]) -> Result<()> {
            Ok(())
        }
        async fn update(
            &self,
            _: &str,
            _: Option<&str>,
            _: Option<&common::Metadata>,
        ) -> Result<()> {
            Ok(())
        }
        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_vector_failure_is_reported_in_answer() {
        let pipeline = pipeline(Arc::new(ScriptedModel::constant("unused")), Arc::new(DownIndex));
        let result = pipeline.ask("anything", &AskOptions::default()).await;
        assert_eq!(
            result.answer,
            "An error occurred while processing your request: Retrieval error: down"
        );
    }

    #[tokio::test]
    async fn test_hybrid_ask_includes_graph_context_in_prompt() {
        let vector = memory_vector();
        vector
            .add_texts(&["Shivaji was born in Shivneri fort.".to_string()], None, None)
            .await
            .unwrap();

        let answer_json = r#"{"facts": ["birthplace"], "answer": "Shivneri fort"}"#;
        let model = Arc::new(ScriptedModel::new(move |prompt, _| {
            if prompt.starts_with("Context:") {
                Ok(answer_json.to_string())
            } else {
                Ok(EXTRACTION.to_string())
            }
        }));
        let graph = GraphStore::connected(
            Arc::new(MemoryGraph::new()),
            EntityExtractor::new(model.clone()),
        );
        graph
            .add_document_to_graph("Shivaji was born in Shivneri fort.", None)
            .await
            .unwrap();

        let pipeline = AnswerPipeline::new(
            model.clone(),
            vector,
            Arc::new(graph),
            RagSettings::default(),
        );
        let result = pipeline
            .ask("Where was Shivaji born?", &AskOptions::default())
            .await;
        assert_eq!(result.answer, "Shivneri fort");

        let answer_prompt = model
            .prompts()
            .into_iter()
            .find(|p| p.starts_with("Context:"))
            .unwrap();
        assert!(answer_prompt.contains("- [Graph Context] Graph Context:"));
    }

    #[test]
    fn test_parse_answer_requires_both_keys() {
        assert!(parse_answer(r#"{"answer": "x"}"#).is_err());
        assert!(parse_answer(r#"["x"]"#).is_err());
    }

    #[test]
    fn test_parse_answer_stringifies_non_strings() {
        let result = parse_answer(r#"{"facts": ["a", 2, {"k": 1}], "answer": 42}"#).unwrap();
        assert_eq!(result.facts, vec!["a", "2", r#"{"k":1}"#]);
        assert_eq!(result.answer, "42");
    }
}
