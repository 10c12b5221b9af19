//! Query parser.
//!
//! Grammar, one statement per newline (`\r` is equivalent to `\n`):
//!
//! ```text
//! statement := [op] key sep value
//! op        := '+' (AND) | '-' (NOT) | (absent → OR)
//! sep       := ':' | '<' | '>'
//! key       := identifier (possibly prefixed by '_')
//! value     := free text, optionally 'quoted', optionally followed by
//!              '~' (fuzzy) or '*' (prefix); \…\ passes the value verbatim
//! ```
//!
//! The output is a singly-linked chain of query nodes in source order.
//! When a value tokenizes to several terms the extra terms hang off the
//! statement through `then` (an inner conjunction), distinct from the
//! inter-statement `next`.

use crate::analysis::Analyzer;
use crate::error::{ArborError, Result};

/// Inter-statement boolean operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Or,
    And,
    Not,
}

/// Value modifier: how the term is matched against the term tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermModifier {
    Exact,
    Fuzzy,
    Prefix,
}

/// Comparison form of a statement (`key<value` / `key>value`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Gt,
}

/// One term of the parsed query.
#[derive(Debug)]
pub struct QueryNode {
    pub op: QueryOp,
    pub key: String,
    pub term: String,
    pub modifier: TermModifier,
    pub comparison: Option<Comparison>,
    /// The value was `\…\`-escaped and skipped tokenization.
    pub verbatim: bool,
    /// Further terms of the same statement (inner conjunction).
    pub then: Option<Box<QueryNode>>,
    /// The next statement.
    pub next: Option<Box<QueryNode>>,
}

/// Parses query strings with the collection's analyzer, so query terms
/// agree with indexed terms.
#[derive(Debug, Clone)]
pub struct QueryParser {
    analyzer: Analyzer,
}

impl QueryParser {
    pub fn new(analyzer: Analyzer) -> Self {
        Self { analyzer }
    }

    /// Parse a query. An empty (or all-blank) query is `Ok(None)`: it
    /// produces an empty result, not an error.
    pub fn parse(&self, input: &str) -> Result<Option<Box<QueryNode>>> {
        let mut statements = Vec::new();
        for raw in split_statements(input) {
            if let Some(statement) = self.parse_statement(&raw)? {
                statements.push(statement);
            }
        }

        let mut head = None;
        for mut statement in statements.into_iter().rev() {
            statement.next = head;
            head = Some(Box::new(statement));
        }
        Ok(head)
    }

    fn parse_statement(&self, line: &str) -> Result<Option<QueryNode>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (op, rest) = match line.as_bytes()[0] {
            b'+' => (QueryOp::And, &line[1..]),
            b'-' => (QueryOp::Not, &line[1..]),
            _ => (QueryOp::Or, line),
        };

        let sep = rest
            .char_indices()
            .find(|(_, ch)| matches!(ch, ':' | '<' | '>'))
            .ok_or_else(|| {
                ArborError::parse(format!("statement '{line}' has no ':' separator"))
            })?;
        let comparison = match sep.1 {
            '<' => Some(Comparison::Lt),
            '>' => Some(Comparison::Gt),
            _ => None,
        };

        let key = rest[..sep.0].trim();
        if key.is_empty() {
            return Err(ArborError::parse(format!("statement '{line}' has no key")));
        }
        let raw_value = rest[sep.0 + 1..].trim();

        // Verbatim escape: the value is passed through untouched.
        if raw_value.len() >= 2 && raw_value.starts_with('\\') && raw_value.ends_with('\\') {
            let term = raw_value[1..raw_value.len() - 1].to_string();
            if term.is_empty() {
                return Ok(None);
            }
            return Ok(Some(QueryNode {
                op,
                key: key.to_string(),
                term,
                modifier: TermModifier::Exact,
                comparison,
                verbatim: true,
                then: None,
                next: None,
            }));
        }

        let (value, modifier) = match raw_value.bytes().last() {
            Some(b'~') => (&raw_value[..raw_value.len() - 1], TermModifier::Fuzzy),
            Some(b'*') => (&raw_value[..raw_value.len() - 1], TermModifier::Prefix),
            _ => (raw_value, TermModifier::Exact),
        };
        let value = value.trim();
        let value = if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
            &value[1..value.len() - 1]
        } else {
            value
        };

        let analyzed = self.analyzer.analyze_query_value(key, value);
        let mut terms = analyzed.tokens();
        let Some(first) = terms.next() else {
            return Ok(None);
        };

        let mut head = QueryNode {
            op,
            key: key.to_string(),
            term: first.to_string(),
            modifier,
            comparison,
            verbatim: false,
            then: None,
            next: None,
        };

        // Extra terms of one statement form an inner conjunction.
        let mut rest_terms: Vec<&str> = terms.collect();
        let mut then = None;
        while let Some(term) = rest_terms.pop() {
            then = Some(Box::new(QueryNode {
                op: QueryOp::And,
                key: key.to_string(),
                term: term.to_string(),
                modifier,
                comparison,
                verbatim: false,
                then,
                next: None,
            }));
        }
        head.then = then;

        Ok(Some(head))
    }
}

/// Split a query into raw statements.
///
/// Statements end at newlines (`\r` equals `\n`) and at a `+`/`-` that
/// begins the next statement on the same line. Quoted values and `\…\`
/// escapes shield their content from both.
fn split_statements(input: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut in_escape = false;

    let mut push = |buffer: &mut String| {
        if !buffer.trim().is_empty() {
            statements.push(std::mem::take(buffer));
        } else {
            buffer.clear();
        }
    };

    for ch in input.chars() {
        match ch {
            '\n' | '\r' if !in_quote && !in_escape => push(&mut current),
            '\'' if !in_escape => {
                in_quote = !in_quote;
                current.push(ch);
            }
            '\\' => {
                in_escape = !in_escape;
                current.push(ch);
            }
            '+' | '-' if !in_quote && !in_escape && !current.trim().is_empty() => {
                push(&mut current);
                current.push(ch);
            }
            _ => current.push(ch),
        }
    }
    push(&mut current);
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Option<Box<QueryNode>> {
        QueryParser::new(Analyzer::new(64)).parse(input).unwrap()
    }

    #[test]
    fn test_default_op_is_or() {
        let node = parse("title:rambo").unwrap();
        assert_eq!(node.op, QueryOp::Or);
        assert_eq!(node.key, "title");
        assert_eq!(node.term, "rambo");
        assert!(node.next.is_none());
    }

    #[test]
    fn test_plus_is_and_minus_is_not() {
        assert_eq!(parse("+k:v").unwrap().op, QueryOp::And);
        assert_eq!(parse("-k:v").unwrap().op, QueryOp::Not);
    }

    #[test]
    fn test_statements_in_source_order() {
        let node = parse("k:v\nk:w").unwrap();
        assert_eq!(node.term, "v");
        let second = node.next.as_ref().unwrap();
        assert_eq!(second.term, "w");
        assert!(second.next.is_none());
    }

    #[test]
    fn test_carriage_return_separates() {
        let node = parse("k:v\rk:w").unwrap();
        assert!(node.next.is_some());
    }

    #[test]
    fn test_inline_statement_composition() {
        let node = parse("+title:'the'-title:'ugly'").unwrap();
        assert_eq!(node.op, QueryOp::And);
        assert_eq!(node.term, "the");
        let second = node.next.as_ref().unwrap();
        assert_eq!(second.op, QueryOp::Not);
        assert_eq!(second.term, "ugly");
        assert!(second.next.is_none());
    }

    #[test]
    fn test_quotes_shield_operators() {
        let node = parse("title:'spider-man'").unwrap();
        assert_eq!(node.term, "spider");
        let then = node.then.as_ref().unwrap();
        assert_eq!(then.term, "man");
        assert!(node.next.is_none());
    }

    #[test]
    fn test_quoted_value_and_modifiers() {
        let node = parse("title:'rambo'").unwrap();
        assert_eq!(node.term, "rambo");
        assert_eq!(node.modifier, TermModifier::Exact);

        let node = parse("title:'raider'~").unwrap();
        assert_eq!(node.term, "raider");
        assert_eq!(node.modifier, TermModifier::Fuzzy);

        let node = parse("title:'ra'*").unwrap();
        assert_eq!(node.term, "ra");
        assert_eq!(node.modifier, TermModifier::Prefix);
    }

    #[test]
    fn test_multi_term_value_chains_through_then() {
        let node = parse("title:'the rain man'").unwrap();
        assert_eq!(node.term, "the");
        let then = node.then.as_ref().unwrap();
        assert_eq!(then.term, "rain");
        assert_eq!(then.op, QueryOp::And);
        let then = then.then.as_ref().unwrap();
        assert_eq!(then.term, "man");
        assert!(then.then.is_none());
        assert!(node.next.is_none());
    }

    #[test]
    fn test_comparison_forms() {
        let node = parse("year>1980").unwrap();
        assert_eq!(node.comparison, Some(Comparison::Gt));
        assert_eq!(node.term, "1980");

        let node = parse("+year<1990").unwrap();
        assert_eq!(node.comparison, Some(Comparison::Lt));
        assert_eq!(node.op, QueryOp::And);
    }

    #[test]
    fn test_verbatim_escape() {
        let node = parse(r"_created:\2020-01-01T00:00:00\").unwrap();
        assert!(node.verbatim);
        assert_eq!(node.term, "2020-01-01T00:00:00");
        assert!(node.then.is_none());
    }

    #[test]
    fn test_missing_separator_is_parse_error() {
        let result = QueryParser::new(Analyzer::new(64)).parse("rambo");
        assert!(matches!(result, Err(ArborError::Parse(_))));
    }

    #[test]
    fn test_empty_query_is_none() {
        assert!(parse("").is_none());
        assert!(parse("  \n \r ").is_none());
    }
}
