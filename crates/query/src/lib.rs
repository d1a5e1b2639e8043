pub mod answer;
pub mod strategy;

pub use answer::{
    AnswerPipeline, AnswerResult, AskOptions, AskOutcome, NO_CONTEXT_ANSWER, SYSTEM_PROMPT,
    UNEXPECTED_ERROR_ANSWER, build_prompt, parse_answer,
};
pub use strategy::{GRAPH_CONTEXT_PREFIX, RetrievalOptions, RetrievalOutcome, RetrievalStrategy};
