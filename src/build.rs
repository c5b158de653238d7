//! Orden `build`: construye el árbol de código y lo vuelca en el almacén de
//! grafos, respetando la protección contra escrituras sobre una base de datos
//! que ya tiene contenido.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::code_tree::{build_tree, export_code_tree, TreeBuildOptions};
use crate::config::StoreConfig;
use crate::error::BuildError;
use crate::graph_store::{GraphStore, Neo4jGraphStore};
use crate::models::{NodeRecord, NodeType};
use crate::progress::ProgressSink;

/// Resumen de una construcción completa.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub folders: usize,
    pub files: usize,
    pub functions: usize,
    pub classes: usize,
    pub code_pieces: usize,
    pub relationships: usize,
}

impl BuildSummary {
    fn from_records(records: &[NodeRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.node_type {
                NodeType::Folder => summary.folders += 1,
                NodeType::File => summary.files += 1,
                NodeType::Function => summary.functions += 1,
                NodeType::Class => summary.classes += 1,
                NodeType::CodePiece => summary.code_pieces += 1,
            }
        }
        summary
    }

    pub fn nodes(&self) -> usize {
        self.folders + self.files + self.functions + self.classes + self.code_pieces
    }
}

impl std::fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} carpetas, {} ficheros, {} funciones, {} clases, {} fragmentos y {} relaciones.",
            self.folders, self.files, self.functions, self.classes, self.code_pieces, self.relationships
        )
    }
}

/// Parámetros de una ejecución de `build`.
#[derive(Debug, Clone)]
pub struct BuildCommand {
    pub path: PathBuf,
    pub reset: bool,
    pub options: TreeBuildOptions,
}

impl BuildCommand {
    pub fn new(path: PathBuf, reset: bool) -> Self {
        Self {
            path,
            reset,
            options: TreeBuildOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TreeBuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Conecta con Neo4j, ejecuta la construcción y libera la conexión al
    /// salir, tanto si termina bien como si falla.
    pub async fn run_scoped(
        &self,
        cfg: &StoreConfig,
        sink: &dyn ProgressSink,
    ) -> Result<BuildSummary, BuildError> {
        let store = Neo4jGraphStore::connect(cfg).await?;
        self.run(&store, sink).await
    }

    /// Ejecuta la construcción contra un almacén ya conectado.
    pub async fn run<S>(&self, store: &S, sink: &dyn ProgressSink) -> Result<BuildSummary, BuildError>
    where
        S: GraphStore + ?Sized,
    {
        info!("Ejecutando build en {}", self.path.display());

        // 1. Protección: no escribir sobre datos existentes sin --reset.
        let node_count = store.get_node_count().await?;
        if self.reset {
            warn!("Vaciando la base de datos ({node_count} nodos)");
            store.reset_database().await?;
            let remaining = store.get_node_count().await?;
            info!("Nodos tras el vaciado: {remaining}");
        } else if node_count > 0 {
            return Err(BuildError::NonEmptyDatabase { node_count });
        }
        store.ensure_schema().await?;

        // 2. Árbol de código en memoria.
        let tree = build_tree(&self.path, self.options, sink)?;

        // 3. Exportación en preorden.
        let records = export_code_tree(&tree);
        let mut summary = BuildSummary::from_records(&records);

        // 4. Inserción en dos fases.
        let inserted = store.insert_data(&records, sink).await?;
        summary.relationships = inserted.relationships;

        info!("{summary}");
        Ok(summary)
    }
}
