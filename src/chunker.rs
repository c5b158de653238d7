//! División de un fichero Python en trozos semánticos de nivel superior:
//! funciones, clases y fragmentos de código (todo lo demás).

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;
use tree_sitter::{Node, Parser};

use crate::error::ChunkerError;
use crate::formatter::{
    module_shape, parse_python, python_parser, syntax_shape, unparse_node, Formatter, LINE_SEPARATOR,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Function,
    Class,
    CodePiece,
}

/// Un trozo del cuerpo de nivel superior de un fichero, ya formateado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    pub chunk_type: ChunkType,
    pub code: String,
    /// Posición en `code` de la palabra clave de la definición (`def`,
    /// `async def` o `class`), tras los decoradores. 0 en los fragmentos.
    pub header_start: usize,
}

impl CodeChunk {
    pub fn new(chunk_type: ChunkType, code: String) -> Self {
        Self {
            chunk_type,
            code,
            header_start: 0,
        }
    }

    /// Cabecera de la definición sin decoradores.
    pub fn header(&self) -> &str {
        self.code.get(self.header_start..).unwrap_or(&self.code)
    }
}

/// `true` si la ruta es un fichero regular con extensión `.py`.
pub fn is_python_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("py"))
}

/// Trocea ficheros Python reutilizando el mismo parser y formateador.
pub struct SourceChunker {
    parser: Parser,
    formatter: Formatter,
}

impl SourceChunker {
    pub fn new() -> Result<Self, ChunkerError> {
        Ok(Self {
            parser: python_parser()?,
            formatter: Formatter::new()?,
        })
    }

    /// Lee y trocea un fichero completo.
    pub fn split_file(&mut self, path: &Path) -> Result<Vec<CodeChunk>, ChunkerError> {
        let content = fs::read_to_string(path).map_err(|source| ChunkerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.split(&content)
    }

    /// Analiza `source` y devuelve sus trozos en el orden del fichero.
    ///
    /// Cada sentencia de nivel superior se regenera desde el árbol sintáctico;
    /// los fragmentos contiguos se fusionan y todos los trozos pasan por el
    /// formateador. Los trozos resultantes, analizados de nuevo, deben
    /// reproducir exactamente la estructura de las sentencias del fichero.
    /// Cualquier fallo invalida el fichero entero.
    pub fn split(&mut self, source: &str) -> Result<Vec<CodeChunk>, ChunkerError> {
        let tree = parse_python(&mut self.parser, source)?;
        let root = tree.root_node();

        let mut cursor = root.walk();
        let statements: Vec<_> = root
            .named_children(&mut cursor)
            .filter(|node| node.kind() != "comment")
            .collect();

        let mut expected = Vec::new();
        let mut chunks = Vec::with_capacity(statements.len());
        for statement in statements {
            expected.extend(syntax_shape(statement));
            chunks.push(CodeChunk::new(
                classify(statement),
                unparse_node(statement, source)?,
            ));
        }

        let joined = join_code_pieces(chunks);
        debug!("{} trozos tras fusionar fragmentos", joined.len());

        let mut formatted = Vec::with_capacity(joined.len());
        let mut rebuilt = Vec::with_capacity(expected.len());
        for chunk in joined {
            let code = self.formatter.format(&chunk.code)?;
            let reparsed = parse_python(&mut self.parser, &code).map_err(|e| {
                ChunkerError::format(format!("El trozo formateado no es código válido: {e}"))
            })?;
            let module = reparsed.root_node();
            rebuilt.extend(module_shape(module));

            let header_start = match chunk.chunk_type {
                ChunkType::CodePiece => 0,
                ChunkType::Function | ChunkType::Class => definition_start(module),
            };
            formatted.push(CodeChunk {
                chunk_type: chunk.chunk_type,
                code,
                header_start,
            });
        }

        if rebuilt != expected {
            return Err(ChunkerError::format(
                "Los trozos no reproducen las sentencias de nivel superior del fichero",
            ));
        }
        Ok(formatted)
    }
}

/// Trocea el fichero en `path` con un `SourceChunker` nuevo.
pub fn split_code_file_into_chunks(path: &Path) -> Result<Vec<CodeChunk>, ChunkerError> {
    SourceChunker::new()?.split_file(path)
}

/// Trocea código fuente ya cargado en memoria.
pub fn split_code_into_chunks(source: &str) -> Result<Vec<CodeChunk>, ChunkerError> {
    SourceChunker::new()?.split(source)
}

/// Inicio de la definición (sin decoradores) de la primera sentencia.
fn definition_start(module: Node) -> usize {
    let mut cursor = module.walk();
    let first = module
        .named_children(&mut cursor)
        .find(|node| node.kind() != "comment");

    match first {
        Some(node) if node.kind() == "decorated_definition" => node
            .child_by_field_name("definition")
            .unwrap_or(node)
            .start_byte(),
        Some(node) => node.start_byte(),
        None => 0,
    }
}

fn classify(node: Node) -> ChunkType {
    let node = match node.kind() {
        "decorated_definition" => node.child_by_field_name("definition").unwrap_or(node),
        _ => node,
    };

    match node.kind() {
        "function_definition" => ChunkType::Function,
        "class_definition" => ChunkType::Class,
        _ => ChunkType::CodePiece,
    }
}

/// Une los `code_piece` consecutivos en uno solo, separados por
/// `LINE_SEPARATOR`. Funciones y clases nunca se fusionan.
pub fn join_code_pieces(chunks: Vec<CodeChunk>) -> Vec<CodeChunk> {
    let mut joined: Vec<CodeChunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        match joined.last_mut() {
            Some(last)
                if last.chunk_type == ChunkType::CodePiece
                    && chunk.chunk_type == ChunkType::CodePiece =>
            {
                last.code.push_str(LINE_SEPARATOR);
                last.code.push_str(&chunk.code);
            }
            _ => joined.push(chunk),
        }
    }

    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn kinds(chunks: &[CodeChunk]) -> Vec<ChunkType> {
        chunks.iter().map(|chunk| chunk.chunk_type).collect()
    }

    #[test]
    fn function_class_and_merged_imports() {
        let source = "import os\nimport sys\n\n\ndef main(argv):\n    return 0\n\n\nclass Runner(Base):\n    def run(self):\n        pass\n";
        let chunks = split_code_into_chunks(source).unwrap();

        assert_eq!(
            kinds(&chunks),
            vec![ChunkType::CodePiece, ChunkType::Function, ChunkType::Class]
        );
        assert_eq!(
            chunks[0].code,
            format!("import os{LINE_SEPARATOR}import sys{LINE_SEPARATOR}")
        );
        assert_eq!(chunks[1].code, "def main(argv):\n    return 0\n");
        assert_eq!(
            chunks[2].code,
            "class Runner(Base):\n    def run(self):\n        pass\n"
        );
    }

    #[test]
    fn code_pieces_separated_by_definitions_stay_apart() {
        let source = "A = 1\ndef f():\n    pass\nB = 2\nC = 3\nasync def g():\n    pass\n";
        let chunks = split_code_into_chunks(source).unwrap();

        assert_eq!(
            kinds(&chunks),
            vec![
                ChunkType::CodePiece,
                ChunkType::Function,
                ChunkType::CodePiece,
                ChunkType::Function,
            ]
        );
        assert_eq!(chunks[2].code, format!("B = 2{LINE_SEPARATOR}C = 3{LINE_SEPARATOR}"));
    }

    #[test]
    fn consecutive_definitions_are_never_merged() {
        let source = "def a():\n    pass\ndef b():\n    pass\nclass C:\n    pass\nclass D:\n    pass\n";
        let chunks = split_code_into_chunks(source).unwrap();
        assert_eq!(
            kinds(&chunks),
            vec![
                ChunkType::Function,
                ChunkType::Function,
                ChunkType::Class,
                ChunkType::Class,
            ]
        );
    }

    #[test]
    fn decorated_definitions_keep_their_type() {
        let source = "@dataclass\nclass Point:\n    x: int\n\n@lru_cache(maxsize=None)\ndef fib(n):\n    return n\n";
        let chunks = split_code_into_chunks(source).unwrap();

        assert_eq!(kinds(&chunks), vec![ChunkType::Class, ChunkType::Function]);
        assert_eq!(chunks[0].code, "@dataclass\nclass Point:\n    x: int\n");
        assert_eq!(chunks[1].code, "@lru_cache(maxsize=None)\ndef fib(n):\n    return n\n");
    }

    fn top_level_kinds(parser: &mut Parser, source: &str) -> Vec<String> {
        let tree = parse_python(parser, source).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let names = root
            .named_children(&mut cursor)
            .filter(|node| node.kind() != "comment")
            .map(|node| node.kind().to_string())
            .collect();
        names
    }

    fn assert_covered(source: &str) -> Vec<CodeChunk> {
        let chunks = split_code_into_chunks(source).unwrap();
        let rebuilt: String = chunks.iter().map(|chunk| chunk.code.as_str()).collect();

        let mut parser = python_parser().unwrap();
        assert_eq!(
            top_level_kinds(&mut parser, &rebuilt),
            top_level_kinds(&mut parser, source)
        );
        let original = parse_python(&mut parser, source).unwrap();
        let again = parse_python(&mut parser, &rebuilt).unwrap();
        assert_eq!(module_shape(again.root_node()), module_shape(original.root_node()));
        chunks
    }

    #[test]
    fn every_top_level_statement_is_covered() {
        let source = "\"\"\"Módulo.\"\"\"\nimport re  # regex\nX = re.compile('a')\nif X:\n    def inner():\n        pass\nclass K:\n    pass\nprint(X)\n";
        let chunks = assert_covered(source);

        assert_eq!(
            kinds(&chunks),
            vec![ChunkType::CodePiece, ChunkType::Class, ChunkType::CodePiece]
        );
        assert!(chunks.iter().all(|chunk| !chunk.code.contains("# regex")));
    }

    #[test]
    fn continued_string_concatenation_is_one_statement() {
        let chunks = assert_covered("x = 'a' \\\n    'b'\n");
        assert_eq!(chunks, vec![CodeChunk::new(ChunkType::CodePiece, "x = 'a' 'b'\n".into())]);

        let chunks = assert_covered("def f():\n    return 'a' \\\n        'b'\n");
        assert_eq!(chunks[0].code, "def f():\n    return 'a' 'b'\n");

        assert_covered("x = f'{a}' \\\n    f'{b}'\ny = 1\n");
    }

    #[test]
    fn decorator_with_multiline_string_points_at_the_definition() {
        let source = "@app.route(\"\"\"\n/x\"\"\")\ndef f():\n    pass\n";
        let chunks = assert_covered(source);

        assert_eq!(kinds(&chunks), vec![ChunkType::Function]);
        assert!(chunks[0].code.starts_with("@app.route("));
        assert_eq!(chunks[0].header(), "def f():\n    pass\n");

        let chunks = split_code_into_chunks("@dataclass\nclass P:\n    x: int\n").unwrap();
        assert_eq!(chunks[0].header_start, "@dataclass\n".len());
        assert!(chunks[0].header().starts_with("class P:"));
    }

    #[test]
    fn comments_only_file_has_no_chunks() {
        assert!(split_code_into_chunks("# nada\n\n# que ver\n").unwrap().is_empty());
        assert!(split_code_into_chunks("").unwrap().is_empty());
    }

    #[test]
    fn syntax_error_fails_the_file() {
        let err = split_code_into_chunks("def ok():\n    pass\n\ndef broken(:\n").unwrap_err();
        assert!(matches!(err, ChunkerError::Parse { .. }));
    }

    #[test]
    fn split_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.py");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "def f(x):\n    return x").unwrap();

        let chunks = split_code_file_into_chunks(&path).unwrap();
        assert_eq!(chunks, vec![CodeChunk::new(ChunkType::Function, "def f(x):\n    return x\n".into())]);

        let err = split_code_file_into_chunks(&dir.path().join("missing.py")).unwrap_err();
        assert!(matches!(err, ChunkerError::Read { .. }));
    }

    #[test]
    fn python_file_detection() {
        let dir = tempfile::tempdir().unwrap();
        let upper = dir.path().join("SCRIPT.PY");
        let text = dir.path().join("notes.txt");
        File::create(&upper).unwrap();
        File::create(&text).unwrap();

        assert!(is_python_file(&upper));
        assert!(!is_python_file(&text));
        assert!(!is_python_file(dir.path()));
    }
}
