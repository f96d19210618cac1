//! Boolean tag-expression DSL (spec §4.5): `prod AND (api OR internal) AND NOT beta`,
//! or the symbolic shorthand `prod + (api, internal) + !beta`.
//!
//! No teacher counterpart — the desktop app has no tag system at all. Shaped
//! as a small hand-rolled recursive-descent parser, which is how the pack's
//! `doublegate-Only1MCP` and `Mira` router examples build their own
//! mini query languages rather than pulling in a parser-combinator crate
//! for something this small.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagExpr {
    Atom(String),
    And(Vec<TagExpr>),
    Or(Vec<TagExpr>),
    Not(Box<TagExpr>),
}

impl TagExpr {
    /// Evaluate against a normalized (lowercased) tag set.
    pub fn matches(&self, tags: &std::collections::HashSet<String>) -> bool {
        match self {
            TagExpr::Atom(a) => tags.contains(a),
            TagExpr::And(parts) => parts.iter().all(|p| p.matches(tags)),
            TagExpr::Or(parts) => parts.iter().any(|p| p.matches(tags)),
            TagExpr::Not(inner) => !inner.matches(tags),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DslError(pub String);

impl fmt::Display for DslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag filter parse error: {}", self.0)
    }
}
impl std::error::Error for DslError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Atom(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, DslError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '+' | ',' => {
                chars.next();
                tokens.push(if c == '+' { Token::And } else { Token::Or });
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            _ if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' => {
                let mut atom = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' {
                        atom.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match atom.to_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Atom(atom.to_lowercase()),
                });
            }
            other => return Err(DslError(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Result<TagExpr, DslError> {
        let mut terms = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { TagExpr::Or(terms) })
    }

    fn parse_and(&mut self) -> Result<TagExpr, DslError> {
        let mut terms = vec![self.parse_not()?];
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            terms.push(self.parse_not()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { TagExpr::And(terms) })
    }

    fn parse_not(&mut self) -> Result<TagExpr, DslError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            if matches!(self.peek(), Some(Token::And) | Some(Token::Or) | Some(Token::Not) | None) {
                return Err(DslError("NOT must be followed by an atom or parenthesized expression".to_string()));
            }
            let inner = self.parse_not()?;
            return Ok(TagExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<TagExpr, DslError> {
        match self.advance() {
            Some(Token::Atom(a)) => Ok(TagExpr::Atom(a)),
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(DslError("unbalanced parentheses: expected ')'".to_string())),
                }
            }
            Some(other) => Err(DslError(format!("unexpected token {:?}, expected an atom or '('", other))),
            None => Err(DslError("unexpected end of expression".to_string())),
        }
    }
}

/// Parse a tag boolean expression into a [`TagExpr`] tree.
pub fn parse(input: &str) -> Result<TagExpr, DslError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DslError("empty tag filter expression".to_string()));
    }
    let tokens = tokenize(trimmed)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(DslError(format!("unexpected trailing token at position {}", parser.pos)));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tags(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_single_atom() {
        let expr = parse("prod").unwrap();
        assert_eq!(expr, TagExpr::Atom("prod".to_string()));
    }

    #[test]
    fn parses_and_or_not_keywords() {
        let expr = parse("prod AND (api OR internal) AND NOT beta").unwrap();
        assert!(expr.matches(&tags(&["prod", "api"])));
        assert!(!expr.matches(&tags(&["prod", "api", "beta"])));
        assert!(!expr.matches(&tags(&["prod"])));
    }

    #[test]
    fn parses_symbolic_shorthand() {
        let expr = parse("prod + (api, internal) + !beta").unwrap();
        assert!(expr.matches(&tags(&["prod", "internal"])));
        assert!(!expr.matches(&tags(&["prod", "internal", "beta"])));
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(parse("(prod AND api").is_err());
        assert!(parse("prod AND api)").is_err());
    }

    #[test]
    fn rejects_empty_expression() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn rejects_nested_operators_without_operand() {
        assert!(parse("AND prod").is_err());
        assert!(parse("prod AND AND api").is_err());
        assert!(parse("NOT AND prod").is_err());
    }

    #[test]
    fn is_case_insensitive_on_keywords_and_case_folds_atoms() {
        let expr = parse("PROD and API").unwrap();
        assert!(expr.matches(&tags(&["prod", "api"])));
    }
}
