use serde::{Deserialize, Deserializer, Serialize};

/// Closed set of entity kinds accepted in the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Concept,
    #[default]
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Location => "LOCATION",
            Self::Concept => "CONCEPT",
            Self::Other => "OTHER",
        }
    }
}

impl From<String> for EntityType {
    fn from(raw: String) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PERSON" => Self::Person,
            "ORGANIZATION" => Self::Organization,
            "LOCATION" => Self::Location,
            "CONCEPT" => Self::Concept,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCandidate {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub relation_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

/// Entities and relationships the LLM found in one text span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub entities: Vec<EntityCandidate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relationships: Vec<RelationshipCandidate>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// Non-blank entity names, in extraction order.
    pub fn entity_names(&self) -> Vec<String> {
        self.entities
            .iter()
            .map(|e| e.name.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_default_to_empty() {
        let result: ExtractionResult = serde_json::from_str("{}").unwrap();
        assert!(result.is_empty());

        let result: ExtractionResult =
            serde_json::from_str(r#"{"entities": [{"name": "Neo4j", "type": "concept"}]}"#)
                .unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].entity_type, EntityType::Concept);
        assert!(result.relationships.is_empty());
    }

    #[test]
    fn test_unknown_or_null_types_become_other() {
        let result: ExtractionResult = serde_json::from_str(
            r#"{"entities": [{"name": "Qdrant", "type": "TECHNOLOGY"}, {"name": "x", "type": null}, {"name": "y"}],
                "relationships": null}"#,
        )
        .unwrap();
        assert!(result.entities.iter().all(|e| e.entity_type == EntityType::Other));
        assert!(result.relationships.is_empty());
    }

    #[test]
    fn test_relationship_fields_default() {
        let result: ExtractionResult = serde_json::from_str(
            r#"{"relationships": [{"source": "A", "target": "B"}]}"#,
        )
        .unwrap();
        let rel = &result.relationships[0];
        assert_eq!(rel.relation_type, "");
        assert_eq!(rel.description, "");
    }

    #[test]
    fn test_entity_type_serializes_uppercase() {
        let json = serde_json::to_string(&EntityType::Organization).unwrap();
        assert_eq!(json, "\"ORGANIZATION\"");
    }
}
