//! Template Substitution.
//!
//! Parses a calculated-measure template containing `{member}` /
//! `{Cube.member}` tokens and splices each token with its resolved
//! fragment from a [`ResolvedMeasures`] map, preserving the child
//! fragments as [`SqlExpr`] subtrees rather than string
//! concatenation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CompileError, Result};
use crate::sql::expr::{SqlExpr, TemplatePart};

/// `[A-Za-z_][A-Za-z0-9_.]*` with at most one dot.
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum RawToken {
    Text(String),
    Reference(String),
}

/// Tokenize `template`, validating brace/identifier syntax up front so a
/// malformed template is rejected before any substitution is attempted.
fn tokenize(template: &str) -> Result<Vec<RawToken>> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if !text.is_empty() {
                    tokens.push(RawToken::Text(std::mem::take(&mut text)));
                }
                let mut ident = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => {
                            return Err(CompileError::InvalidTemplate(format!(
                                "nested '{{' inside token in template '{}'",
                                template
                            )))
                        }
                        Some(c) => ident.push(c),
                        None => {
                            return Err(CompileError::InvalidTemplate(format!(
                                "unmatched '{{' in template '{}'",
                                template
                            )))
                        }
                    }
                }
                if ident.is_empty() {
                    return Err(CompileError::InvalidTemplate(format!("empty token '{{}}' in template '{}'", template)));
                }
                if !IDENTIFIER.is_match(&ident) {
                    return Err(CompileError::InvalidTemplate(format!(
                        "invalid member reference '{{{}}}' in template '{}'",
                        ident, template
                    )));
                }
                tokens.push(RawToken::Reference(ident));
            }
            '}' => {
                return Err(CompileError::InvalidTemplate(format!("unmatched '}}' in template '{}'", template)));
            }
            other => text.push(other),
        }
    }
    if !text.is_empty() {
        tokens.push(RawToken::Text(text));
    }
    Ok(tokens)
}

/// Every `{member}`/`{Cube.member}` reference in `template`, in the order
/// they appear - used by the Calculated Measure Resolver to build the
/// dependency graph before any substitution happens.
pub fn extract_references(template: &str) -> Result<Vec<String>> {
    Ok(tokenize(template)?
        .into_iter()
        .filter_map(|t| match t {
            RawToken::Reference(name) => Some(name),
            RawToken::Text(_) => None,
        })
        .collect())
}

/// Substitute every token in `template` with its resolved fragment,
/// looked up in `resolve` (typically a closure over a `ResolvedMeasures`
/// map already populated in topological order). Local references
/// (no dot) resolve relative to `local_cube`.
pub fn substitute(template: &str, local_cube: &str, mut resolve: impl FnMut(&str) -> Option<SqlExpr>) -> Result<SqlExpr> {
    let tokens = tokenize(template)?;
    let mut parts = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            RawToken::Text(text) => parts.push(TemplatePart::Text(text)),
            RawToken::Reference(name) => {
                let qualified = if name.contains('.') { name.clone() } else { format!("{}.{}", local_cube, name) };
                let fragment = resolve(&qualified).ok_or_else(|| CompileError::UnresolvedMember(qualified.clone()))?;
                parts.push(TemplatePart::Fragment(Box::new(fragment)));
            }
        }
    }
    Ok(SqlExpr::Template(parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_references_local_and_qualified() {
        let refs = extract_references("100.0 * {activeCount} / {Employees.count}").unwrap();
        assert_eq!(refs, vec!["activeCount", "Employees.count"]);
    }

    #[test]
    fn test_rejects_empty_token() {
        assert!(matches!(extract_references("{}"), Err(CompileError::InvalidTemplate(_))));
    }

    #[test]
    fn test_rejects_unmatched_brace() {
        assert!(matches!(extract_references("{count"), Err(CompileError::InvalidTemplate(_))));
        assert!(matches!(extract_references("count}"), Err(CompileError::InvalidTemplate(_))));
    }

    #[test]
    fn test_rejects_nested_brace() {
        assert!(matches!(extract_references("{co{unt}"), Err(CompileError::InvalidTemplate(_))));
    }

    #[test]
    fn test_rejects_multi_dot_identifier() {
        assert!(matches!(extract_references("{a.b.c}"), Err(CompileError::InvalidTemplate(_))));
    }

    #[test]
    fn test_substitute_preserves_fragments() {
        let result = substitute("100.0 * {activeCount} / {count}", "Employees", |name| {
            Some(SqlExpr::raw(format!("<{}>", name)))
        })
        .unwrap();
        match result {
            SqlExpr::Template(parts) => assert_eq!(parts.len(), 4),
            _ => panic!("expected a template"),
        }
    }

    #[test]
    fn test_unresolved_reference_errors() {
        let result = substitute("{missing}", "Employees", |_| None);
        assert!(matches!(result, Err(CompileError::UnresolvedMember(_))));
    }
}
