//! Almacén de grafos: conexión a Neo4j, inspección, borrado e inserción en
//! dos fases (primero todos los nodos, después las relaciones padre-hijo).
//!
//! Cada escritura es su propia transacción; un fallo a mitad de la carga deja
//! la base de datos parcialmente poblada.

use async_trait::async_trait;
use neo4rs::{query, Graph, Query};
use tracing::{debug, info};
use url::Url;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::NodeRecord;
use crate::progress::ProgressSink;

const DEFAULT_BOLT_PORT: u16 = 7687;

/// Resultado de `insert_data`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InsertSummary {
    pub nodes: usize,
    pub relationships: usize,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Número total de nodos almacenados.
    async fn get_node_count(&self) -> Result<i64, StoreError>;

    /// Elimina todos los nodos y relaciones.
    async fn reset_database(&self) -> Result<(), StoreError>;

    /// Crea los índices o restricciones que necesite el almacén.
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Crea un nodo con `id`, `type`, `name` y `path`.
    ///
    /// `code_content` no se escribe todavía.
    async fn insert_node(&self, record: &NodeRecord) -> Result<(), StoreError>;

    /// Crea `(padre)-[:HAS_CHILD]->(hijo)` buscando ambos extremos por `id`.
    async fn insert_relationship(&self, parent_id: &str, child_id: &str) -> Result<(), StoreError>;

    /// Inserta todos los registros y después todas sus relaciones. Los
    /// registros deben venir en preorden.
    async fn insert_data(
        &self,
        records: &[NodeRecord],
        sink: &dyn ProgressSink,
    ) -> Result<InsertSummary, StoreError> {
        let mut summary = InsertSummary::default();
        let total = records.len() as u64;

        let progress = sink.begin("Escribiendo nodos en la base de datos", total);
        for record in records {
            self.insert_node(record).await?;
            summary.nodes += 1;
            progress.advance();
        }
        progress.finish();

        let progress = sink.begin("Creando relaciones padre-hijo", total);
        for record in records {
            if let Some(parent) = &record.parent {
                self.insert_relationship(parent, &record.id).await?;
                summary.relationships += 1;
            }
            progress.advance();
        }
        progress.finish();

        info!(
            "Insertados {} nodos y {} relaciones",
            summary.nodes, summary.relationships
        );
        Ok(summary)
    }
}

/// Conexión a Neo4j. Se libera al soltar el valor.
pub struct Neo4jGraphStore {
    graph: Graph,
    address: String,
}

impl Neo4jGraphStore {
    /// Conecta y verifica la conexión con una consulta trivial.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let address = bolt_address(&cfg.neo4j_uri)?;

        info!("Conectando a Neo4j en {address}...");
        let graph = Graph::new(&address, &cfg.neo4j_user, &cfg.neo4j_password)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!("Conexión a Neo4j OK");

        Ok(Self { graph, address })
    }

    /// Ejecuta una escritura en su propia transacción.
    async fn write(&self, q: Query) -> Result<(), StoreError> {
        let txn = self.graph.start_txn().await?;
        txn.run(q).await?;
        txn.commit().await?;
        Ok(())
    }
}

impl Drop for Neo4jGraphStore {
    fn drop(&mut self) {
        debug!("Cerrando la conexión con Neo4j en {}", self.address);
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn get_node_count(&self) -> Result<i64, StoreError> {
        let mut cursor = self
            .graph
            .execute(query("MATCH (n) RETURN count(n) AS node_count"))
            .await?;

        let row = cursor
            .next()
            .await?
            .ok_or_else(|| StoreError::Query("El recuento de nodos no devolvió filas".into()))?;
        row.get::<i64>("node_count")
            .ok_or_else(|| StoreError::Query("Falta campo 'node_count' en resultado de Neo4j".into()))
    }

    async fn reset_database(&self) -> Result<(), StoreError> {
        self.write(query("MATCH (n) DETACH DELETE n")).await?;
        info!("Base de datos vaciada");
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.graph
            .run(query(
                "CREATE CONSTRAINT node_id IF NOT EXISTS
                 FOR (n:Node)
                 REQUIRE n.id IS UNIQUE",
            ))
            .await?;
        debug!("Esquema de Neo4j asegurado (constraint sobre Node.id)");
        Ok(())
    }

    async fn insert_node(&self, record: &NodeRecord) -> Result<(), StoreError> {
        let q = match &record.name {
            Some(name) => query("CREATE (n:Node {id: $id, type: $type, name: $name, path: $path})")
                .param("name", name.clone()),
            // Una propiedad nula en Neo4j equivale a no tenerla.
            None => query("CREATE (n:Node {id: $id, type: $type, path: $path})"),
        };

        self.write(
            q.param("id", record.id.clone())
                .param("type", record.node_type.as_str())
                .param("path", record.path.clone()),
        )
        .await
    }

    async fn insert_relationship(&self, parent_id: &str, child_id: &str) -> Result<(), StoreError> {
        self.write(
            query(
                "MATCH (child:Node {id: $child_id})
                 WITH child
                 MATCH (parent:Node {id: $parent_id})
                 CREATE (parent)-[:HAS_CHILD]->(child)",
            )
            .param("child_id", child_id)
            .param("parent_id", parent_id),
        )
        .await
    }
}

/// Convierte la URI de Neo4j en la dirección `host:puerto` del protocolo Bolt.
pub fn bolt_address(uri: &str) -> Result<String, StoreError> {
    let url = Url::parse(uri).map_err(|e| StoreError::InvalidUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(DEFAULT_BOLT_PORT);
    Ok(format!("{host}:{port}"))
}
