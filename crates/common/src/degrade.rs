use serde::Serialize;

/// A failure that was absorbed instead of propagated.
///
/// Returned next to the value of an operation that fell back to a reduced
/// path (vector-only retrieval, empty extraction, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
    pub stage: String,
    pub reason: String,
}

impl Degradation {
    pub fn new(stage: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.reason)
    }
}
