//! Regeneración y formato canónico de código Python.
//!
//! El texto se reconstruye a partir del flujo de tokens del árbol sintáctico
//! (no copiando rangos del original): los comentarios desaparecen, las
//! construcciones entre paréntesis que ocupan varias líneas se unen en una,
//! la sangría se recalcula a cuatro espacios por bloque y el espaciado entre
//! tokens sigue un conjunto fijo de reglas.

use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::ChunkerError;

/// Separador de líneas de la plataforma.
pub const LINE_SEPARATOR: &str = if cfg!(windows) { "\r\n" } else { "\n" };

const INDENT: &str = "    ";

/// Nodos que se emiten como un único token, sin descender.
const ATOMIC_KINDS: &[&str] = &["string"];

const DEFINITION_KINDS: &[&str] = &[
    "function_definition",
    "class_definition",
    "decorated_definition",
];

const UNARY_PARENTS: &[&str] = &[
    "unary_operator",
    "list_splat",
    "dictionary_splat",
    "list_splat_pattern",
    "dictionary_splat_pattern",
    "splat_pattern",
];

const TIGHT_ASSIGN_PARENTS: &[&str] = &["keyword_argument", "default_parameter", "keyword_pattern"];

/// Nodos que no forman parte de la estructura de una sentencia.
const EXTRA_KINDS: &[&str] = &["comment", "line_continuation"];

/// Crea un parser de tree-sitter para Python.
pub fn python_parser() -> Result<Parser, ChunkerError> {
    let language: Language = tree_sitter_python::LANGUAGE.into();
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| ChunkerError::tree_sitter(format!("No se pudo cargar la gramática: {e}")))?;
    Ok(parser)
}

/// Analiza `source` y rechaza cualquier árbol con errores o nodos ausentes.
pub fn parse_python(parser: &mut Parser, source: &str) -> Result<Tree, ChunkerError> {
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ChunkerError::tree_sitter("El parser no devolvió ningún árbol"))?;

    let root = tree.root_node();
    if root.has_error() {
        let position = first_error(root)
            .map(|node| node.start_position())
            .unwrap_or_else(|| root.start_position());
        return Err(ChunkerError::Parse {
            line: position.row + 1,
            column: position.column + 1,
        });
    }

    Ok(tree)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

/// Regenera el texto de un nodo (una sentencia de nivel superior) sin salto
/// de línea final.
pub fn unparse_node(node: Node, source: &str) -> Result<String, ChunkerError> {
    let tokens = collect_tokens(node, source)?;
    Ok(render(&tokens, node, "\n"))
}

/// `\r\n` si la primera línea de la entrada termina así; `\n` en otro caso.
pub fn detect_line_ending(source: &str) -> &'static str {
    match source.find('\n') {
        Some(pos) if source[..pos].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

/// Secuencia en preorden de los tipos de nodo con nombre bajo `node`,
/// sin comentarios ni continuaciones de línea. Dos fragmentos con la misma
/// forma tienen la misma estructura sintáctica.
pub fn syntax_shape(node: Node) -> Vec<&'static str> {
    let mut shape = Vec::new();
    push_shape(node, &mut shape);
    shape
}

/// Forma de todas las sentencias de nivel superior de un módulo.
pub fn module_shape(root: Node) -> Vec<&'static str> {
    let mut shape = Vec::new();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        push_shape(child, &mut shape);
    }
    shape
}

fn push_shape(node: Node, shape: &mut Vec<&'static str>) {
    if EXTRA_KINDS.contains(&node.kind()) {
        return;
    }
    if node.is_named() {
        shape.push(node.kind());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        push_shape(child, shape);
    }
}

/// Formateador determinista de módulos completos.
///
/// Cada resultado se vuelve a analizar: debe tener la misma estructura y los
/// mismos tokens que la entrada, y formatearlo otra vez no debe cambiarlo.
pub struct Formatter {
    parser: Parser,
}

impl Formatter {
    pub fn new() -> Result<Self, ChunkerError> {
        Ok(Self {
            parser: python_parser()?,
        })
    }

    /// Devuelve `source` en formato canónico, terminado en un único salto de
    /// línea (o vacío si no contiene ninguna sentencia).
    pub fn format(&mut self, source: &str) -> Result<String, ChunkerError> {
        let tree = parse_python(&mut self.parser, source)?;
        let line_ending = detect_line_ending(source);
        let formatted = render_module(tree.root_node(), source, line_ending)?;

        self.verify(&tree, source, &formatted, line_ending)?;
        Ok(formatted)
    }

    fn verify(
        &mut self,
        original: &Tree,
        source: &str,
        formatted: &str,
        line_ending: &str,
    ) -> Result<(), ChunkerError> {
        let reparsed = parse_python(&mut self.parser, formatted)
            .map_err(|e| ChunkerError::format(format!("La salida no es código válido: {e}")))?;

        if module_shape(original.root_node()) != module_shape(reparsed.root_node()) {
            return Err(ChunkerError::format(
                "La salida no tiene la misma estructura sintáctica que la entrada",
            ));
        }

        let before = token_texts(original.root_node(), source)?;
        let after = token_texts(reparsed.root_node(), formatted)?;
        if before != after {
            let position = before
                .iter()
                .zip(after.iter())
                .position(|(a, b)| a != b)
                .unwrap_or(before.len().min(after.len()));
            return Err(ChunkerError::format(format!(
                "La salida no es equivalente a la entrada (token {position})"
            )));
        }

        let second_pass = render_module(reparsed.root_node(), formatted, line_ending)?;
        if second_pass != formatted {
            return Err(ChunkerError::format("El formato no es estable"));
        }

        Ok(())
    }
}

fn render_module(root: Node, source: &str, line_ending: &str) -> Result<String, ChunkerError> {
    let tokens = collect_tokens(root, source)?;
    let mut output = render(&tokens, root, line_ending);
    if !output.is_empty() {
        output.push_str(line_ending);
    }
    Ok(output)
}

fn token_texts<'a>(root: Node<'a>, source: &'a str) -> Result<Vec<&'a str>, ChunkerError> {
    Ok(collect_tokens(root, source)?
        .into_iter()
        .map(|token| token.text)
        .collect())
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    node: Node<'a>,
    text: &'a str,
    after_continuation: bool,
}

impl Token<'_> {
    fn end_byte(&self) -> usize {
        self.node.start_byte() + self.text.len()
    }

    fn is_punct(&self, punct: &[&str]) -> bool {
        !self.node.is_named() && punct.contains(&self.text)
    }

    fn parent_kind(&self) -> &'static str {
        self.node.parent().map(|parent| parent.kind()).unwrap_or_default()
    }

    fn is_keyword(&self) -> bool {
        !self.node.is_named() && self.text.chars().all(|c| c.is_ascii_alphabetic())
    }

    /// Fin de un átomo: identificador, literal o cierre de corchete.
    fn ends_atom(&self) -> bool {
        self.node.is_named() || self.is_punct(&[")", "]", "}"])
    }
}

fn collect_tokens<'a>(root: Node<'a>, source: &'a str) -> Result<Vec<Token<'a>>, ChunkerError> {
    let mut tokens = Vec::new();
    push_tokens(root, source, &mut tokens)?;

    // Las continuaciones pueden quedar colgando de cualquier nodo (también
    // dentro de un literal atómico), así que se buscan en el texto entre
    // tokens.
    for i in 1..tokens.len() {
        let gap = source
            .get(tokens[i - 1].end_byte()..tokens[i].node.start_byte())
            .unwrap_or_default();
        tokens[i].after_continuation = has_line_continuation(gap);
    }
    Ok(tokens)
}

fn push_tokens<'a>(
    node: Node<'a>,
    source: &'a str,
    tokens: &mut Vec<Token<'a>>,
) -> Result<(), ChunkerError> {
    if EXTRA_KINDS.contains(&node.kind()) {
        return Ok(());
    }

    if node.child_count() == 0 || ATOMIC_KINDS.contains(&node.kind()) {
        let end = atomic_end(node);
        if node.start_byte() == end {
            return Ok(());
        }
        let text = source.get(node.start_byte()..end).ok_or_else(|| {
            ChunkerError::tree_sitter(format!("Rango de bytes inválido para '{}'", node.kind()))
        })?;
        tokens.push(Token {
            node,
            text,
            after_continuation: false,
        });
        return Ok(());
    }

    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    for child in children {
        push_tokens(child, source, tokens)?;
    }
    Ok(())
}

/// Fin del texto propio de un nodo atómico, sin extras colgados al final.
fn atomic_end(node: Node) -> usize {
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .rev()
        .find(|child| !EXTRA_KINDS.contains(&child.kind()))
        .map(|child| child.end_byte())
        .unwrap_or_else(|| node.end_byte())
}

/// `true` si el hueco entre dos tokens contiene una barra invertida al
/// final de una línea (fuera de comentarios).
fn has_line_continuation(gap: &str) -> bool {
    let mut lines: Vec<&str> = gap.split('\n').collect();
    lines.pop();
    lines.iter().any(|line| {
        line.split('#')
            .next()
            .unwrap_or_default()
            .trim_end()
            .ends_with('\\')
    })
}

fn render(tokens: &[Token], root: Node, line_ending: &str) -> String {
    let mut output = String::new();
    let mut brackets = 0i32;
    let mut previous: Option<&Token> = None;

    for token in tokens {
        match previous {
            None => {
                push_indent(&mut output, block_depth(token.node, root));
            }
            Some(prev)
                if brackets <= 0
                    && !token.after_continuation
                    && token.node.start_position().row > prev.node.end_position().row =>
            {
                let depth = block_depth(token.node, root);
                output.push_str(line_ending);
                for _ in 0..blank_lines_before(token.node, root, depth) {
                    output.push_str(line_ending);
                }
                push_indent(&mut output, depth);
            }
            Some(prev) => {
                if needs_space(prev, token) {
                    output.push(' ');
                }
            }
        }

        output.push_str(token.text);

        if token.is_punct(&["(", "[", "{"]) {
            brackets += 1;
        } else if token.is_punct(&[")", "]", "}"]) {
            brackets -= 1;
        }
        previous = Some(token);
    }

    output
}

fn push_indent(output: &mut String, depth: usize) {
    for _ in 0..depth {
        output.push_str(INDENT);
    }
}

/// Número de bloques que envuelven a `node` por debajo de `root`.
fn block_depth(node: Node, root: Node) -> usize {
    let mut depth = 0;
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.id() == root.id() {
            break;
        }
        if parent.kind() == "block" {
            depth += 1;
        }
        current = parent.parent();
    }
    depth
}

/// Sentencia que empieza exactamente en `token`, si la hay dentro de `root`.
fn statement_at<'a>(token: Node<'a>, root: Node<'a>) -> Option<Node<'a>> {
    let mut node = token;
    loop {
        if node.id() == root.id() {
            return None;
        }
        let parent = node.parent()?;
        if parent.kind() == "block" || (parent.id() == root.id() && root.kind() == "module") {
            return Some(node);
        }
        if parent.start_byte() != token.start_byte() {
            return None;
        }
        node = parent;
    }
}

fn blank_lines_before(token: Node, root: Node, depth: usize) -> usize {
    let Some(statement) = statement_at(token, root) else {
        return 0;
    };

    let mut previous = statement.prev_named_sibling();
    while let Some(node) = previous {
        if node.kind() != "comment" {
            break;
        }
        previous = node.prev_named_sibling();
    }

    match previous {
        Some(prev)
            if DEFINITION_KINDS.contains(&statement.kind())
                || DEFINITION_KINDS.contains(&prev.kind()) =>
        {
            if depth == 0 {
                2
            } else {
                1
            }
        }
        _ => 0,
    }
}

fn needs_space(prev: &Token, next: &Token) -> bool {
    if next.is_punct(&[")", "]", "}", ",", ";", ":"]) {
        return false;
    }
    if prev.is_punct(&["(", "[", "{"]) {
        return false;
    }

    // Acceso a atributos e imports relativos (`from . import x`).
    if next.is_punct(&["."]) {
        return prev.is_keyword();
    }
    if prev.is_punct(&["."]) {
        return next.is_keyword() && next.text == "import";
    }

    if prev.is_punct(&[":"]) && prev.parent_kind() == "slice" {
        return false;
    }
    if prev.is_punct(&["*", "**", "-", "+", "~"]) && UNARY_PARENTS.contains(&prev.parent_kind()) {
        return false;
    }
    if prev.is_punct(&["@"]) && prev.parent_kind() == "decorator" {
        return false;
    }
    if (prev.is_punct(&["="]) && TIGHT_ASSIGN_PARENTS.contains(&prev.parent_kind()))
        || (next.is_punct(&["="]) && TIGHT_ASSIGN_PARENTS.contains(&next.parent_kind()))
    {
        return false;
    }

    // Llamadas y subíndices.
    if next.is_punct(&["(", "["]) && prev.ends_atom() {
        return false;
    }

    true
}
