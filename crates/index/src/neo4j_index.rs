use anyhow::{Context, Result};
use async_trait::async_trait;
use common::GraphSettings;
use extract::EntityType;
use neo4rs::{ConfigBuilder, Graph, Query};

use crate::graph::{EntityNeighborhood, GraphBackend, GraphStats, NeighborLink};

pub struct Neo4jBackend {
    graph: Graph,
}

impl Neo4jBackend {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    /// Open a connection and check the server answers.
    pub async fn connect(settings: &GraphSettings) -> Result<Self> {
        let uri = settings.uri.as_deref().context("NEO4J_URI is not set")?;
        let password = settings
            .password
            .as_deref()
            .context("NEO4J_PASSWORD is not set")?;

        let config = ConfigBuilder::default()
            .uri(uri)
            .user(settings.user.as_str())
            .password(password)
            .db(settings.database.as_str())
            .build()
            .context("Invalid Neo4j configuration")?;

        let graph = Graph::connect(config)
            .await
            .context("Could not connect to Neo4j")?;

        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .context("Neo4j connectivity check failed")?;

        Ok(Self::new(graph))
    }

    async fn count(&self, cypher: &str) -> Result<usize> {
        let mut result = self.graph.execute(Query::new(cypher.to_string())).await?;
        let count = if let Some(row) = result.next().await? {
            row.get::<i64>("count").unwrap_or(0) as usize
        } else {
            0
        };
        Ok(count)
    }
}

#[async_trait]
impl GraphBackend for Neo4jBackend {
    async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT entity_id IF NOT EXISTS FOR (e:Entity) REQUIRE e.id IS UNIQUE",
            "CREATE INDEX entity_name IF NOT EXISTS FOR (e:Entity) ON (e.name)",
            "CREATE INDEX entity_type IF NOT EXISTS FOR (e:Entity) ON (e.type)",
        ];

        for statement in statements {
            self.graph
                .run(Query::new(statement.to_string()))
                .await
                .with_context(|| format!("Failed to run schema statement: {}", statement))?;
        }
        Ok(())
    }

    async fn merge_entity(&self, id: &str, name: &str, entity_type: EntityType) -> Result<()> {
        let query = Query::new(
            r#"
            MERGE (e:Entity {id: $id})
            ON CREATE SET e.created = timestamp()
            SET e.name = $name,
                e.type = $type,
                e.last_seen = timestamp()
            "#
            .to_string(),
        )
        .param("id", id.to_string())
        .param("name", name.to_string())
        .param("type", entity_type.as_str().to_string());

        self.graph
            .run(query)
            .await
            .context("Failed to merge entity")?;
        Ok(())
    }

    async fn find_entity_id(&self, name: &str) -> Result<Option<String>> {
        let query = Query::new(
            r#"
            MATCH (e:Entity)
            WHERE toLower(e.name) = toLower($name)
            RETURN e.id AS id
            ORDER BY e.id
            LIMIT 1
            "#
            .to_string(),
        )
        .param("name", name.trim().to_string());

        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to look up entity")?;

        Ok(match result.next().await? {
            Some(row) => row.get::<String>("id").ok(),
            None => None,
        })
    }

    async fn merge_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        description: &str,
    ) -> Result<()> {
        let query = Query::new(
            r#"
            MATCH (source:Entity {id: $source_id})
            MATCH (target:Entity {id: $target_id})
            MERGE (source)-[r:RELATES_TO {type: $rel_type}]->(target)
            ON CREATE SET r.created = timestamp()
            SET r.description = $description,
                r.last_seen = timestamp()
            "#
            .to_string(),
        )
        .param("source_id", source_id.to_string())
        .param("target_id", target_id.to_string())
        .param("rel_type", relation_type.to_string())
        .param("description", description.to_string());

        self.graph
            .run(query)
            .await
            .context("Failed to merge relationship")?;
        Ok(())
    }

    async fn neighborhoods(&self, fragment: &str, limit: usize) -> Result<Vec<EntityNeighborhood>> {
        // one row per (entity, edge); entities without edges get a single null row
        let query = Query::new(
            r#"
            MATCH (e:Entity)
            WHERE toLower(e.name) CONTAINS toLower($fragment)
            WITH e ORDER BY e.id LIMIT $limit
            OPTIONAL MATCH (e)-[r:RELATES_TO]-(related:Entity)
            RETURN e.id AS entity_id,
                   e.name AS entity_name,
                   e.type AS entity_type,
                   related.name AS related,
                   r.type AS relation,
                   r.description AS description
            ORDER BY e.id, r.type, related.name
            "#
            .to_string(),
        )
        .param("fragment", fragment.trim().to_string())
        .param("limit", limit as i64);

        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to query entity neighborhoods")?;

        let mut found: Vec<(String, EntityNeighborhood)> = Vec::new();
        while let Some(row) = result.next().await? {
            let entity_id: String = row.get("entity_id").unwrap_or_default();
            if found.last().is_none_or(|(id, _)| *id != entity_id) {
                found.push((
                    entity_id.clone(),
                    EntityNeighborhood {
                        name: row.get("entity_name").unwrap_or_default(),
                        entity_type: row.get("entity_type").unwrap_or_default(),
                        links: Vec::new(),
                    },
                ));
            }

            let related: Option<String> = row.get("related").unwrap_or(None);
            if let (Some(related), Some((_, neighborhood))) = (related, found.last_mut()) {
                neighborhood.links.push(NeighborLink {
                    related,
                    relation: row
                        .get::<Option<String>>("relation")
                        .unwrap_or(None)
                        .unwrap_or_default(),
                    description: row
                        .get::<Option<String>>("description")
                        .unwrap_or(None)
                        .unwrap_or_default(),
                });
            }
        }

        Ok(found.into_iter().map(|(_, n)| n).collect())
    }

    async fn clear(&self) -> Result<()> {
        self.graph
            .run(Query::new("MATCH (n) DETACH DELETE n".to_string()))
            .await
            .context("Failed to clear graph")?;
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let entity_count = self
            .count("MATCH (e:Entity) RETURN count(e) as count")
            .await?;
        let relation_count = self
            .count("MATCH ()-[r:RELATES_TO]->() RETURN count(r) as count")
            .await?;

        Ok(GraphStats {
            entity_count,
            relation_count,
        })
    }
}
