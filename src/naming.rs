//! Extracción de la firma canónica de funciones y clases.
//!
//! La firma es el nombre visible de los nodos `function` y `class`: el texto
//! de la cabecera sin la palabra clave y sin ningún espacio en blanco.
//!
//! Ambas funciones reciben el código a partir de la palabra clave (`def`,
//! `async def` o `class`); los decoradores los separa antes el troceador con
//! el árbol sintáctico.

use crate::error::NameError;

/// Firma de una función: desde el nombre hasta el paréntesis que cierra la
/// lista de parámetros. `def foo(a, b=(1,2)):` produce `foo(a,b=(1,2))`.
///
/// Ni el `:` final ni la anotación de retorno forman parte de la firma.
pub fn get_function_definition(code: &str) -> Result<String, NameError> {
    let header = code.trim_start();
    let header = header
        .strip_prefix("async")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim_start)
        .unwrap_or(header);
    let rest = strip_keyword(header, "def")?;

    let open = rest
        .find('(')
        .ok_or_else(|| NameError::UnbalancedParentheses(first_line(code)))?;
    let close = matching_parenthesis(rest, open)
        .ok_or_else(|| NameError::UnbalancedParentheses(first_line(code)))?;

    Ok(strip_whitespace(&rest[..=close]))
}

/// Firma de una clase: `class Foo:` produce `Foo` y `class Foo(Base):`
/// produce `Foo(Base)`.
///
/// Se decide comparando la posición del primer `(` con la del primer `:` de
/// nivel superior (fuera de corchetes y paréntesis).
pub fn get_class_definition(code: &str) -> Result<String, NameError> {
    let rest = strip_keyword(code.trim_start(), "class")?;

    let first_par = rest.find('(');
    let first_colon = top_level_colon(rest);

    let end = match (first_par, first_colon) {
        (Some(par), Some(colon)) if colon < par => colon,
        (Some(par), _) => matching_parenthesis(rest, par)
            .map(|close| close + 1)
            .ok_or_else(|| NameError::UnbalancedParentheses(first_line(code)))?,
        (None, Some(colon)) => colon,
        (None, None) => return Err(NameError::MissingColon(first_line(code))),
    };

    Ok(strip_whitespace(&rest[..end]))
}

fn strip_keyword<'a>(header: &'a str, keyword: &'static str) -> Result<&'a str, NameError> {
    header
        .strip_prefix(keyword)
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim_start)
        .ok_or_else(|| NameError::MissingKeyword {
            keyword,
            header: first_line(header),
        })
}

/// Índice del paréntesis que cierra al abierto en `open`, contando niveles.
fn matching_parenthesis(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in text[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn top_level_colon(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn first_line(text: &str) -> String {
    text.trim_start().lines().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_signature_stops_at_closing_parenthesis_without_colon() {
        let name = get_function_definition("def foo(a, b=(1,2)):\n  pass").unwrap();
        assert_eq!(name, "foo(a,b=(1,2))");
    }

    #[test]
    fn function_signature_drops_return_annotation() {
        let name = get_function_definition("def parse(text: str) -> list[int]:\n    ...").unwrap();
        assert_eq!(name, "parse(text:str)");
    }

    #[test]
    fn async_functions() {
        let name = get_function_definition("async def fetch(url):\n    pass").unwrap();
        assert_eq!(name, "fetch(url)");
        let name = get_function_definition("async  def\tgo(*args, **kw):\n    pass").unwrap();
        assert_eq!(name, "go(*args,**kw)");
    }

    #[test]
    fn header_must_start_at_the_keyword() {
        let code = "@app.get(\"/\")\ndef index(request):\n    return 1\n";
        let err = get_function_definition(code).unwrap_err();
        assert!(matches!(err, NameError::MissingKeyword { keyword: "def", .. }));
    }

    #[test]
    fn function_signature_spanning_lines() {
        let code = "def build(\n    a,\n    b = dict(x=(1, 2)),\n):\n    pass";
        assert_eq!(get_function_definition(code).unwrap(), "build(a,b=dict(x=(1,2)),)");
    }

    #[test]
    fn unbalanced_function_header_fails() {
        let err = get_function_definition("def broken(a, (b:\n").unwrap_err();
        assert!(matches!(err, NameError::UnbalancedParentheses(_)));
    }

    #[test]
    fn function_without_keyword_fails() {
        let err = get_function_definition("class Foo:\n    pass").unwrap_err();
        assert!(matches!(err, NameError::MissingKeyword { keyword: "def", .. }));
    }

    #[test]
    fn class_without_bases() {
        assert_eq!(get_class_definition("class Foo:\n  pass").unwrap(), "Foo");
    }

    #[test]
    fn class_with_bases() {
        assert_eq!(get_class_definition("class Foo(Base):\n  pass").unwrap(), "Foo(Base)");
        assert_eq!(
            get_class_definition("class Foo(Base, metaclass=Meta(x)):\n  pass").unwrap(),
            "Foo(Base,metaclass=Meta(x))"
        );
    }

    #[test]
    fn class_colon_before_parenthesis() {
        let code = "class Foo:\n    x = (1, 2)\n";
        assert_eq!(get_class_definition(code).unwrap(), "Foo");
    }

    #[test]
    fn class_base_with_subscript_colon() {
        let code = "class Window(Base[slice(0, 1)]):\n    pass";
        assert_eq!(get_class_definition(code).unwrap(), "Window(Base[slice(0,1)])");
    }

    #[test]
    fn class_header_with_leading_whitespace() {
        let code = "\n  class Point:\n    x: int\n";
        assert_eq!(get_class_definition(code).unwrap(), "Point");
    }

    #[test]
    fn class_without_colon_fails() {
        let err = get_class_definition("class Foo").unwrap_err();
        assert!(matches!(err, NameError::MissingColon(_)));
    }
}
