//! SQLite backend
//!
//! Each aggregate is persisted as one row: the id, an integer `version`
//! column used for optimistic concurrency, and the serde JSON document of
//! the aggregate. Updates are guarded with `WHERE id = ? AND version = ?`;
//! zero affected rows means another writer got there first.

use crate::error::{Result, StoreError};
use crate::traits::Backend;
use async_trait::async_trait;
use pixelgraph_core::{GraphId, ImageGraph, Layout, Viewport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const GRAPHS_TABLE: &str = "image_graphs";
const LAYOUTS_TABLE: &str = "layouts";
const VIEWPORTS_TABLE: &str = "viewports";

/// Aggregate backend over a SQLite database
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (creating if missing) the database at `database_url` and ensure
    /// the schema exists
    ///
    /// The pool is limited to a single connection: in-memory databases are
    /// per-connection, and the write pattern here is one row per commit.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let backend = Self { pool };
        backend.ensure_schema().await?;
        tracing::debug!(url = %database_url, "sqlite schema ready");
        Ok(backend)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for table in [GRAPHS_TABLE, LAYOUTS_TABLE, VIEWPORTS_TABLE] {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    version INTEGER NOT NULL,
                    doc TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )"
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn load_doc<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>> {
        let query = format!("SELECT doc FROM {table} WHERE id = ?");
        let row: Option<(String,)> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(doc,)| serde_json::from_str(&doc))
            .transpose()
            .map_err(Into::into)
    }

    async fn store_doc<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        version: u64,
        aggregate: &T,
        expected_version: Option<u64>,
    ) -> Result<()> {
        let doc = serde_json::to_string(aggregate)?;
        let now = chrono::Utc::now().to_rfc3339();
        match expected_version {
            None => {
                let query = format!(
                    "INSERT INTO {table} (id, version, doc, updated_at)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT (id) DO NOTHING"
                );
                let result = sqlx::query(&query)
                    .bind(id)
                    .bind(version as i64)
                    .bind(&doc)
                    .bind(&now)
                    .execute(&self.pool)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::AlreadyExists(id.to_string()));
                }
            }
            Some(expected) => {
                let query = format!(
                    "UPDATE {table} SET version = ?, doc = ?, updated_at = ?
                     WHERE id = ? AND version = ?"
                );
                let result = sqlx::query(&query)
                    .bind(version as i64)
                    .bind(&doc)
                    .bind(&now)
                    .bind(id)
                    .bind(expected as i64)
                    .execute(&self.pool)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::VersionConflict {
                        id: id.to_string(),
                        expected,
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn load_graph(&self, id: GraphId) -> Result<Option<ImageGraph>> {
        self.load_doc(GRAPHS_TABLE, &id.to_string()).await
    }

    async fn store_graph(&self, graph: &ImageGraph, expected_version: Option<u64>) -> Result<()> {
        self.store_doc(
            GRAPHS_TABLE,
            &graph.id().to_string(),
            graph.version(),
            graph,
            expected_version,
        )
        .await
    }

    async fn load_layout(&self, graph_id: GraphId) -> Result<Option<Layout>> {
        self.load_doc(LAYOUTS_TABLE, &graph_id.to_string()).await
    }

    async fn store_layout(&self, layout: &Layout, expected_version: Option<u64>) -> Result<()> {
        self.store_doc(
            LAYOUTS_TABLE,
            &layout.graph_id().to_string(),
            layout.version(),
            layout,
            expected_version,
        )
        .await
    }

    async fn load_viewport(&self, graph_id: GraphId) -> Result<Option<Viewport>> {
        self.load_doc(VIEWPORTS_TABLE, &graph_id.to_string()).await
    }

    async fn store_viewport(
        &self,
        viewport: &Viewport,
        expected_version: Option<u64>,
    ) -> Result<()> {
        self.store_doc(
            VIEWPORTS_TABLE,
            &viewport.graph_id().to_string(),
            viewport.version(),
            viewport,
            expected_version,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelgraph_core::{NodeId, NodeState, NodeType};

    async fn backend() -> SqliteBackend {
        SqliteBackend::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_graph_round_trip_preserves_structure() {
        let backend = backend().await;
        let graph_id = GraphId::new();
        let mut graph = ImageGraph::new(graph_id, "demo").unwrap();
        let input = NodeId::new();
        let blur = NodeId::new();
        graph.add_node(input, NodeType::Input, "source").unwrap();
        graph.add_node(blur, NodeType::Blur, "soften").unwrap();
        graph.connect_nodes(input, "original", blur, "original").unwrap();
        graph.take_events();

        backend.store_graph(&graph, None).await.unwrap();
        let loaded = backend.load_graph(graph_id).await.unwrap().unwrap();

        assert_eq!(loaded.name(), "demo");
        assert_eq!(loaded.version(), graph.version());
        let node = loaded.node(blur).unwrap();
        assert_eq!(node.node_type, NodeType::Blur);
        assert_eq!(node.state, NodeState::Waiting);
        assert!(node.inputs["original"].is_connected());
        assert!(!loaded.has_pending_events());
    }

    #[tokio::test]
    async fn test_optimistic_concurrency() {
        let backend = backend().await;
        let mut graph = ImageGraph::new(GraphId::new(), "demo").unwrap();
        graph.take_events();
        backend.store_graph(&graph, None).await.unwrap();

        assert!(matches!(
            backend.store_graph(&graph, None).await,
            Err(StoreError::AlreadyExists(_))
        ));

        let loaded_version = graph.version();
        graph.add_node(NodeId::new(), NodeType::Blur, "blur").unwrap();
        graph.take_events();
        backend
            .store_graph(&graph, Some(loaded_version))
            .await
            .unwrap();

        // The same observed version cannot win twice.
        assert!(matches!(
            backend.store_graph(&graph, Some(loaded_version)).await,
            Err(StoreError::VersionConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_layout_and_viewport_rows() {
        let backend = backend().await;
        let graph_id = GraphId::new();

        let mut layout = Layout::new(graph_id);
        layout.take_events();
        backend.store_layout(&layout, None).await.unwrap();
        let loaded = backend.load_layout(graph_id).await.unwrap().unwrap();
        assert_eq!(loaded.version(), layout.version());

        let mut viewport = Viewport::new(graph_id);
        viewport.set(2.0, 4.0, 8.0).unwrap();
        viewport.take_events();
        backend.store_viewport(&viewport, None).await.unwrap();
        let loaded = backend.load_viewport(graph_id).await.unwrap().unwrap();
        assert_eq!(loaded.zoom(), 2.0);
        assert_eq!(loaded.pan(), (4.0, 8.0));

        assert!(backend.load_layout(GraphId::new()).await.unwrap().is_none());
    }
}
