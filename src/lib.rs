//! Lilith: índice estructural de un proyecto Python.
//!
//! Recorre un directorio, divide cada fichero `.py` en funciones, clases y
//! fragmentos de código, y exporta el árbol resultante como nodos y
//! relaciones padre-hijo para un almacén de grafos (Neo4j).

pub mod build;
pub mod chunker;
pub mod code_tree;
pub mod config;
pub mod error;
pub mod formatter;
pub mod graph_store;
pub mod models;
pub mod naming;
pub mod progress;

pub use build::{BuildCommand, BuildSummary};
pub use chunker::{split_code_file_into_chunks, split_code_into_chunks, ChunkType, CodeChunk, SourceChunker};
pub use code_tree::{build_tree, export_code_tree, stringify_code_tree, TreeBuildOptions};
pub use config::StoreConfig;
pub use error::{BuildError, ChunkerError, CoreError, NameError, StoreError};
pub use graph_store::{GraphStore, Neo4jGraphStore};
pub use models::{CodeTree, NodeKind, NodeRecord, NodeType};
pub use naming::{get_class_definition, get_function_definition};
pub use progress::{ConsoleProgress, NoProgress, Progress, ProgressSink};
