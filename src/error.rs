//! Taxonomía de errores del indexador.
//!
//! Los errores recuperables a nivel de fichero (hash, metadatos) no aparecen
//! aquí: se registran en el log y la construcción continúa.

use std::path::PathBuf;

use thiserror::Error;

/// Cabecera de función o clase que no se puede interpretar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("La cabecera no empieza por '{keyword}': {header:?}")]
    MissingKeyword { keyword: &'static str, header: String },

    #[error("Paréntesis sin cerrar en la cabecera: {0:?}")]
    UnbalancedParentheses(String),

    #[error("La cabecera de clase no tiene ':' ni '(': {0:?}")]
    MissingColon(String),
}

/// Fallos al trocear un fichero fuente. Todos son fatales para el fichero.
#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("No se pudo leer {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error de sintaxis en la línea {line}, columna {column}")]
    Parse { line: usize, column: usize },

    #[error("Error de formato: {0}")]
    Format(String),

    #[error("Error de tree-sitter: {0}")]
    TreeSitter(String),

    #[error(transparent)]
    Name(#[from] NameError),
}

impl ChunkerError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitter(msg.into())
    }
}

/// Errores fatales al construir el árbol de código.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("La construcción del árbol de código falló al listar {path}: {source}")]
    ListDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No se pudo trocear {path}: {source}")]
    Chunking {
        path: PathBuf,
        #[source]
        source: ChunkerError,
    },

    #[error("La ruta no es un directorio: {0}")]
    NotADirectory(PathBuf),
}

/// Errores del almacén de grafos.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} no está definida.")]
    MissingConfig(&'static str),

    #[error("URI de Neo4j inválida '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("No se pudo establecer la conexión con la base de datos: {0}")]
    Connection(String),

    #[error("Consulta fallida: {0}")]
    Query(String),
}

impl From<neo4rs::Error> for StoreError {
    fn from(err: neo4rs::Error) -> Self {
        Self::Query(err.to_string())
    }
}

/// Errores de la orden `build` completa.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(
        "La base de datos ya contiene {node_count} nodos. \
         Vuelve a ejecutar con --reset para reconstruir el índice."
    )]
    NonEmptyDatabase { node_count: i64 },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
