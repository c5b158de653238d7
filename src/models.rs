//! Modelos de dominio: el árbol de código en memoria y los registros planos
//! que se escriben en Neo4j.
//!
//! El árbol es una arena: cada nodo guarda el índice de su padre y la lista
//! ordenada de índices de sus hijos, de modo que no hay propiedad cíclica.

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::chunker::{ChunkType, CodeChunk};
use crate::error::NameError;
use crate::naming::{get_class_definition, get_function_definition};

/// Tipo de nodo tal y como se exporta (`folder`, `file`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Folder,
    File,
    Function,
    Class,
    CodePiece,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Folder => "folder",
            NodeType::File => "file",
            NodeType::Function => "function",
            NodeType::Class => "class",
            NodeType::CodePiece => "code_piece",
        }
    }
}

/// Metadatos básicos del fichero en el sistema de archivos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub extension: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
    pub modified_at: Option<String>,
}

/// Contenido específico de cada variante de nodo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Folder {
        name: String,
    },
    File {
        name: String,
        content_hash: Option<String>,
        meta: Option<FileMeta>,
    },
    Function {
        name: String,
        code: String,
    },
    Class {
        name: String,
        code: String,
    },
    CodePiece {
        code: String,
    },
}

impl NodeKind {
    /// Construye la variante de un trozo, derivando su firma si la tiene.
    pub fn from_chunk(chunk: CodeChunk) -> Result<Self, NameError> {
        Ok(match chunk.chunk_type {
            ChunkType::Function => NodeKind::Function {
                name: get_function_definition(chunk.header())?,
                code: chunk.code,
            },
            ChunkType::Class => NodeKind::Class {
                name: get_class_definition(chunk.header())?,
                code: chunk.code,
            },
            ChunkType::CodePiece => NodeKind::CodePiece { code: chunk.code },
        })
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Folder { .. } => NodeType::Folder,
            NodeKind::File { .. } => NodeType::File,
            NodeKind::Function { .. } => NodeType::Function,
            NodeKind::Class { .. } => NodeType::Class,
            NodeKind::CodePiece { .. } => NodeType::CodePiece,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            NodeKind::Folder { name }
            | NodeKind::File { name, .. }
            | NodeKind::Function { name, .. }
            | NodeKind::Class { name, .. } => Some(name),
            NodeKind::CodePiece { .. } => None,
        }
    }

    pub fn code_content(&self) -> Option<&str> {
        match self {
            NodeKind::Function { code, .. }
            | NodeKind::Class { code, .. }
            | NodeKind::CodePiece { code } => Some(code),
            NodeKind::Folder { .. } | NodeKind::File { .. } => None,
        }
    }
}

/// Índice de un nodo dentro de su `CodeTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

/// Un nodo del árbol. El `id` se asigna al crearlo y no cambia.
#[derive(Debug, Clone)]
pub struct CodeNode {
    pub id: Uuid,
    pub path: PathBuf,
    pub kind: NodeKind,
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
}

impl CodeNode {
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

/// Árbol de código con una única raíz (la primera inserción).
#[derive(Debug, Clone, Default)]
pub struct CodeTree {
    nodes: Vec<CodeNode>,
}

impl CodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Añade un nodo bajo `parent` (o como raíz si es `None`).
    ///
    /// El padre se fija aquí y no se reasigna nunca.
    pub fn add(&mut self, parent: Option<NodeIndex>, path: &Path, kind: NodeKind) -> NodeIndex {
        debug_assert!(
            parent.is_some() || self.nodes.is_empty(),
            "el árbol sólo admite una raíz"
        );

        let index = NodeIndex(self.nodes.len());
        self.nodes.push(CodeNode {
            id: Uuid::new_v4(),
            path: path.to_path_buf(),
            kind,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(index);
        }
        index
    }

    pub fn root(&self) -> Option<NodeIndex> {
        (!self.nodes.is_empty()).then_some(NodeIndex(0))
    }

    pub fn get(&self, index: NodeIndex) -> &CodeNode {
        &self.nodes[index.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeNode> {
        self.nodes.iter()
    }

    /// Genera el registro plano de un nodo.
    pub fn record(&self, index: NodeIndex) -> NodeRecord {
        let node = self.get(index);
        NodeRecord {
            id: node.id.to_string(),
            node_type: node.node_type(),
            name: node.kind.name().map(str::to_string),
            path: node.path.to_string_lossy().to_string(),
            parent: node.parent.map(|parent| self.get(parent).id.to_string()),
            code_content: node.kind.code_content().map(str::to_string),
            embedding: None,
            description: None,
        }
    }
}

/// Registro plano de un nodo, el contrato entre el exportador y Neo4j.
///
/// `embedding` y `description` quedan reservados para la etapa posterior y
/// siempre se exportan como `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: Option<String>,
    pub path: String,
    pub parent: Option<String>,
    pub code_content: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub description: Option<String>,
}
