use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use extract::{EntityType, same_name};

use crate::graph::{
    EntityNeighborhood, EntityRecord, GraphBackend, GraphStats, NeighborLink, RelationshipRecord,
};

type EdgeKey = (String, String, String);

/// In-process graph backend, used for tests and local runs without Neo4j.
#[derive(Default)]
pub struct MemoryGraph {
    entities: DashMap<String, EntityRecord>,
    relationships: DashMap<EdgeKey, RelationshipRecord>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entities ordered by id.
    pub fn entities(&self) -> Vec<EntityRecord> {
        let mut entities: Vec<EntityRecord> =
            self.entities.iter().map(|e| e.value().clone()).collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    /// All relationships ordered by (source, target, type).
    pub fn relationships(&self) -> Vec<RelationshipRecord> {
        let mut relationships: Vec<(EdgeKey, RelationshipRecord)> = self
            .relationships
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        relationships.sort_by(|a, b| a.0.cmp(&b.0));
        relationships.into_iter().map(|(_, r)| r).collect()
    }

    fn name_of(&self, id: &str) -> String {
        self.entities
            .get(id)
            .map(|e| e.name.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GraphBackend for MemoryGraph {
    async fn ensure_schema(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn merge_entity(
        &self,
        id: &str,
        name: &str,
        entity_type: EntityType,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        self.entities
            .entry(id.to_string())
            .and_modify(|e| {
                e.name = name.to_string();
                e.entity_type = entity_type;
                e.last_seen_at = now;
            })
            .or_insert_with(|| EntityRecord {
                id: id.to_string(),
                name: name.to_string(),
                entity_type,
                created_at: now,
                last_seen_at: now,
            });
        Ok(())
    }

    async fn find_entity_id(&self, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .entities
            .iter()
            .filter(|e| same_name(&e.name, name))
            .map(|e| e.id.clone())
            .min())
    }

    async fn merge_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        description: &str,
    ) -> anyhow::Result<()> {
        if !self.entities.contains_key(source_id) || !self.entities.contains_key(target_id) {
            anyhow::bail!(
                "Cannot link {} to {}: endpoint does not exist",
                source_id,
                target_id
            );
        }

        let now = Utc::now();
        let key = (
            source_id.to_string(),
            target_id.to_string(),
            relation_type.to_string(),
        );
        self.relationships
            .entry(key)
            .and_modify(|r| {
                r.description = description.to_string();
                r.last_seen_at = now;
            })
            .or_insert_with(|| RelationshipRecord {
                source_entity_id: source_id.to_string(),
                target_entity_id: target_id.to_string(),
                relation_type: relation_type.to_string(),
                description: description.to_string(),
                created_at: now,
                last_seen_at: now,
            });
        Ok(())
    }

    async fn neighborhoods(
        &self,
        fragment: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<EntityNeighborhood>> {
        let needle = fragment.trim().to_lowercase();
        let mut matches: Vec<EntityRecord> = self
            .entities
            .iter()
            .filter(|e| e.name.to_lowercase().contains(&needle))
            .map(|e| e.value().clone())
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.truncate(limit);

        let relationships = self.relationships();
        Ok(matches
            .into_iter()
            .map(|entity| {
                let links = relationships
                    .iter()
                    .filter_map(|r| {
                        let other = if r.source_entity_id == entity.id {
                            &r.target_entity_id
                        } else if r.target_entity_id == entity.id {
                            &r.source_entity_id
                        } else {
                            return None;
                        };
                        Some(NeighborLink {
                            related: self.name_of(other),
                            relation: r.relation_type.clone(),
                            description: r.description.clone(),
                        })
                    })
                    .collect();

                EntityNeighborhood {
                    name: entity.name,
                    entity_type: entity.entity_type.to_string(),
                    links,
                }
            })
            .collect())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.relationships.clear();
        self.entities.clear();
        Ok(())
    }

    async fn stats(&self) -> anyhow::Result<GraphStats> {
        Ok(GraphStats {
            entity_count: self.entities.len(),
            relation_count: self.relationships.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_merge_entity_refreshes_without_duplicating() {
        let graph = MemoryGraph::new();
        graph
            .merge_entity("PERSON:Ada", "Ada", EntityType::Person)
            .await
            .unwrap();
        let first = graph.entities()[0].clone();

        graph
            .merge_entity("PERSON:Ada", "Ada", EntityType::Person)
            .await
            .unwrap();
        let entities = graph.entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].created_at, first.created_at);
        assert!(entities[0].last_seen_at >= first.last_seen_at);
    }

    #[tokio::test]
    async fn test_find_entity_is_case_insensitive_and_picks_smallest_id() {
        let graph = MemoryGraph::new();
        graph
            .merge_entity("PERSON:Paris", "Paris", EntityType::Person)
            .await
            .unwrap();
        graph
            .merge_entity("LOCATION:Paris", "Paris", EntityType::Location)
            .await
            .unwrap();

        let id = graph.find_entity_id("  paris ").await.unwrap();
        assert_eq!(id.as_deref(), Some("LOCATION:Paris"));
        assert!(graph.find_entity_id("London").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relationship_description_latest_wins() {
        let graph = MemoryGraph::new();
        graph.merge_entity("PERSON:A", "A", EntityType::Person).await.unwrap();
        graph.merge_entity("PERSON:B", "B", EntityType::Person).await.unwrap();

        graph
            .merge_relationship("PERSON:A", "PERSON:B", "KNOWS", "first")
            .await
            .unwrap();
        graph
            .merge_relationship("PERSON:A", "PERSON:B", "KNOWS", "second")
            .await
            .unwrap();

        let rels = graph.relationships();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].description, "second");
    }

    #[tokio::test]
    async fn test_relationship_requires_endpoints() {
        let graph = MemoryGraph::new();
        graph.merge_entity("PERSON:A", "A", EntityType::Person).await.unwrap();
        assert!(
            graph
                .merge_relationship("PERSON:A", "PERSON:Ghost", "KNOWS", "")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_neighborhoods_include_incoming_edges() {
        let graph = MemoryGraph::new();
        graph.merge_entity("PERSON:A", "Alice", EntityType::Person).await.unwrap();
        graph.merge_entity("PERSON:B", "Bob", EntityType::Person).await.unwrap();
        graph
            .merge_relationship("PERSON:A", "PERSON:B", "KNOWS", "")
            .await
            .unwrap();

        let found = graph.neighborhoods("BOB", 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_type, "PERSON");
        assert_eq!(found[0].links[0].related, "Alice");

        graph.clear().await.unwrap();
        assert_eq!(graph.stats().await.unwrap(), GraphStats::default());
    }
}
