//! Construcción del árbol de código a partir del sistema de archivos y su
//! exportación como lista plana de registros.
//!
//! Forma de cada registro exportado:
//!
//! ```text
//! {
//!     "id": único global,
//!     "type": folder | file | function | class | code_piece,
//!     "name": nombre de la carpeta, fichero, función o clase (null para code_piece),
//!     "path": ruta de la carpeta o del fichero que contiene el trozo,
//!     "parent": id del padre (null sólo para la raíz),
//!     "code_content": código del trozo (null para carpetas y ficheros),
//!     "embedding": null,
//!     "description": null
//! }
//! ```

use std::fs::{self, DirEntry};
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use mime_guess::MimeGuess;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::chunker::{is_python_file, SourceChunker};
use crate::error::{ChunkerError, CoreError};
use crate::formatter::LINE_SEPARATOR;
use crate::models::{CodeTree, FileMeta, NodeIndex, NodeKind, NodeRecord};
use crate::progress::{Progress, ProgressSink};

/// Profundidad máxima por defecto de la exportación (la raíz es el nivel 1).
pub const DEFAULT_MAX_LEVEL: usize = 10;

/// Opciones de construcción del árbol.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBuildOptions {
    /// Ordena las entradas de cada directorio por nombre. Sin esto el orden
    /// es el que devuelva el sistema de archivos.
    pub sort_entries: bool,
}

/// Total de entradas bajo `root`, incluida la propia raíz.
pub fn count_items(root: &Path) -> u64 {
    WalkDir::new(root).into_iter().filter_map(Result::ok).count() as u64
}

/// Construye el árbol completo de `root`, avanzando el progreso una vez por
/// cada carpeta o fichero visitado.
pub fn build_tree(
    root: &Path,
    options: TreeBuildOptions,
    sink: &dyn ProgressSink,
) -> Result<CodeTree, CoreError> {
    if !root.is_dir() {
        return Err(CoreError::NotADirectory(root.to_path_buf()));
    }

    let total_items = count_items(root);
    info!("Construyendo árbol de código de {} ({total_items} elementos)", root.display());

    let chunker = SourceChunker::new().map_err(|source| CoreError::Chunking {
        path: root.to_path_buf(),
        source,
    })?;
    let progress = sink.begin("Construyendo árbol de código", total_items);

    let mut builder = TreeBuilder {
        tree: CodeTree::new(),
        chunker,
        options,
        progress: progress.as_ref(),
    };
    builder.visit_folder(root, None)?;
    progress.finish();

    Ok(builder.tree)
}

struct TreeBuilder<'a> {
    tree: CodeTree,
    chunker: SourceChunker,
    options: TreeBuildOptions,
    progress: &'a dyn Progress,
}

impl TreeBuilder<'_> {
    fn visit_folder(&mut self, path: &Path, parent: Option<NodeIndex>) -> Result<(), CoreError> {
        let node = self
            .tree
            .add(parent, path, NodeKind::Folder { name: display_name(path) });
        self.progress.advance();

        for entry in self.read_entries(path)? {
            let entry_path = entry.path();
            // Los enlaces simbólicos no se siguen: se tratan como ficheros.
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                self.visit_folder(&entry_path, Some(node))?;
            } else {
                self.visit_file(&entry_path, node)?;
            }
        }

        Ok(())
    }

    fn read_entries(&self, path: &Path) -> Result<Vec<DirEntry>, CoreError> {
        let wrap = |source: std::io::Error| {
            error!("No se pudo listar {}: {source}", path.display());
            CoreError::ListDirectory {
                path: path.to_path_buf(),
                source,
            }
        };

        let mut entries = fs::read_dir(path)
            .map_err(wrap)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(wrap)?;

        if self.options.sort_entries {
            entries.sort_by_key(DirEntry::file_name);
        }
        Ok(entries)
    }

    fn visit_file(&mut self, path: &Path, parent: NodeIndex) -> Result<(), CoreError> {
        let kind = NodeKind::File {
            name: display_name(path),
            content_hash: content_hash(path),
            meta: file_meta(path),
        };
        let node = self.tree.add(Some(parent), path, kind);
        self.progress.advance();

        if !is_python_file(path) {
            return Ok(());
        }

        let wrap = |source: ChunkerError| CoreError::Chunking {
            path: path.to_path_buf(),
            source,
        };
        let chunks = self.chunker.split_file(path).map_err(wrap)?;
        debug!("{}: {} trozos", path.display(), chunks.len());

        for chunk in chunks {
            let kind = NodeKind::from_chunk(chunk).map_err(|e| wrap(e.into()))?;
            self.tree.add(Some(node), path, kind);
        }

        Ok(())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// SHA-256 del contenido de texto del fichero. Los fallos se registran y
/// devuelven `None`; nunca detienen la construcción.
fn content_hash(path: &Path) -> Option<String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            match err.kind() {
                ErrorKind::NotFound => {
                    error!("El fichero '{}' no existe.", path.display())
                }
                ErrorKind::PermissionDenied => {
                    error!("No tienes permiso para leer el fichero '{}'.", path.display())
                }
                _ => error!("Error inesperado leyendo '{}': {err}", path.display()),
            }
            return None;
        }
    };

    match String::from_utf8(bytes) {
        Ok(text) => {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            Some(format!("{:x}", hasher.finalize()))
        }
        Err(err) => {
            error!("El fichero '{}' no es texto UTF-8: {err}", path.display());
            None
        }
    }
}

fn file_meta(path: &Path) -> Option<FileMeta> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            error!("No se pudieron leer los metadatos de '{}': {err}", path.display());
            return None;
        }
    };

    let mime: MimeGuess = MimeGuess::from_path(path);
    Some(FileMeta {
        extension: path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned()),
        mime_type: mime.first().map(|m| m.to_string()),
        size_bytes: metadata.len(),
        modified_at: metadata
            .modified()
            .ok()
            .map(|time| DateTime::<Utc>::from(time).to_rfc3339()),
    })
}

/// Recorrido en preorden acotado a `max_level` niveles.
pub struct PreOrderIter<'a> {
    tree: &'a CodeTree,
    stack: Vec<(NodeIndex, usize)>,
    max_level: usize,
}

impl Iterator for PreOrderIter<'_> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, level) = self.stack.pop()?;
        if level < self.max_level {
            let children = self.tree.get(index).children();
            self.stack
                .extend(children.iter().rev().map(|child| (*child, level + 1)));
        }
        Some(index)
    }
}

/// Itera el árbol en preorden: cada padre antes que sus descendientes.
pub fn iterate_code_tree(tree: &CodeTree, max_level: usize) -> PreOrderIter<'_> {
    let stack = match tree.root() {
        Some(root) if max_level > 0 => vec![(root, 1)],
        _ => Vec::new(),
    };
    PreOrderIter {
        tree,
        stack,
        max_level,
    }
}

/// Exporta el árbol con la profundidad por defecto.
pub fn export_code_tree(tree: &CodeTree) -> Vec<NodeRecord> {
    export_code_tree_to_level(tree, DEFAULT_MAX_LEVEL)
}

pub fn export_code_tree_to_level(tree: &CodeTree, max_level: usize) -> Vec<NodeRecord> {
    let records: Vec<NodeRecord> = iterate_code_tree(tree, max_level)
        .map(|index| tree.record(index))
        .collect();

    if records.len() < tree.len() {
        warn!(
            "Exportados {} de {} nodos: el resto supera la profundidad máxima ({max_level})",
            records.len(),
            tree.len()
        );
    }
    records
}

/// Representación del árbol en texto, un nodo por línea.
pub fn stringify_code_tree(tree: &CodeTree) -> String {
    let mut lines = Vec::with_capacity(tree.len());
    if let Some(root) = tree.root() {
        lines.push(node_label(tree, root));
        render_children(tree, root, "", &mut lines);
    }
    lines.join(LINE_SEPARATOR)
}

fn render_children(tree: &CodeTree, index: NodeIndex, prefix: &str, lines: &mut Vec<String>) {
    let children = tree.get(index).children();
    for (position, child) in children.iter().enumerate() {
        let last = position + 1 == children.len();
        let (branch, continuation) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        lines.push(format!("{prefix}{branch}{}", node_label(tree, *child)));
        render_children(tree, *child, &format!("{prefix}{continuation}"), lines);
    }
}

fn node_label(tree: &CodeTree, index: NodeIndex) -> String {
    let kind = &tree.get(index).kind;
    kind.name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("<{}>", kind.node_type().as_str()))
}
