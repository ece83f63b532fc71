//! Text condition parser
//!
//! Parses expressions like:
//! - `location == 'EMPAC'`
//! - `expected_attendance > 100 and visibility != 'private'`
//! - `not (location in ['DCC', 'EMPAC']) or has_external_link == true`
//! - `starts_on between ['2026-01-01', '2026-05-31']` (dates are quoted)
//!
//! `not` binds tighter than `and`, which binds tighter than `or`.
//! Chains of the same combinator collapse into one node.

use super::ast::{CompareOp, ConditionGroup, Literal, LogicalOp};
use crate::error::ApprovalError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Text(String),
    Integer(i64),
    Bool(bool),
    Op(CompareOp),
    And,
    Or,
    Not,
    Contains,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

/// Parse a condition expression string into a tree
pub fn parse(input: &str) -> Result<ConditionGroup, ApprovalError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ApprovalError::malformed(format!(
            "unexpected {:?} in '{}'",
            token, input
        )));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Token>, ApprovalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == quote)
                    .map(|offset| start + offset)
                    .ok_or_else(|| {
                        ApprovalError::malformed(format!("unterminated string in '{}'", input))
                    })?;
                tokens.push(Token::Text(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '=' | '!' | '>' | '<' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::Neq, 2),
                    ('>', Some('=')) => (CompareOp::Gte, 2),
                    ('<', Some('=')) => (CompareOp::Lte, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    ('<', _) => (CompareOp::Lt, 1),
                    _ => {
                        return Err(ApprovalError::malformed(format!(
                            "unknown operator at position {} in '{}'",
                            i, input
                        )))
                    }
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<i64>().map_err(|_| {
                    ApprovalError::malformed(format!("could not parse number '{}'", text))
                })?;
                tokens.push(Token::Integer(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "contains" => Token::Contains,
                    "in" => Token::In,
                    "before" => Token::Op(CompareOp::Before),
                    "after" => Token::Op(CompareOp::After),
                    "between" => Token::Op(CompareOp::Between),
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(ApprovalError::malformed(format!(
                    "unexpected character '{}' in '{}'",
                    other, input
                )))
            }
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

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ApprovalError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(ApprovalError::malformed(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<ConditionGroup, ApprovalError> {
        let mut children = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            children.push(self.parse_and()?);
        }
        Ok(collapse(LogicalOp::Or, children))
    }

    fn parse_and(&mut self) -> Result<ConditionGroup, ApprovalError> {
        let mut children = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            children.push(self.parse_unary()?);
        }
        Ok(collapse(LogicalOp::And, children))
    }

    fn parse_unary(&mut self) -> Result<ConditionGroup, ApprovalError> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(ConditionGroup::negate(self.parse_unary()?))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<ConditionGroup, ApprovalError> {
        let field = match self.next() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(ApprovalError::malformed(format!(
                    "expected field name, found {:?}",
                    other
                )))
            }
        };

        let operator = match self.next() {
            Some(Token::Op(op)) => op,
            Some(Token::Contains) => CompareOp::Contains,
            Some(Token::In) => CompareOp::In,
            Some(Token::Not) => match self.next() {
                Some(Token::Contains) => CompareOp::NotContains,
                Some(Token::In) => CompareOp::NotIn,
                other => {
                    return Err(ApprovalError::malformed(format!(
                        "expected 'contains' or 'in' after 'not', found {:?}",
                        other
                    )))
                }
            },
            other => {
                return Err(ApprovalError::malformed(format!(
                    "expected operator after '{}', found {:?}",
                    field, other
                )))
            }
        };

        let value = self.parse_literal()?;
        Ok(ConditionGroup::compare(field, operator, value))
    }

    fn parse_literal(&mut self) -> Result<Literal, ApprovalError> {
        match self.next() {
            Some(Token::Text(s)) => Ok(Literal::Text(s)),
            Some(Token::Integer(n)) => Ok(Literal::Integer(n)),
            Some(Token::Bool(b)) => Ok(Literal::Boolean(b)),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.pos += 1;
                    return Ok(Literal::List(items));
                }
                loop {
                    items.push(self.parse_literal()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        other => {
                            return Err(ApprovalError::malformed(format!(
                                "expected ',' or ']' in list, found {:?}",
                                other
                            )))
                        }
                    }
                }
                Ok(Literal::List(items))
            }
            other => Err(ApprovalError::malformed(format!(
                "could not parse literal: {:?}",
                other
            ))),
        }
    }
}

fn collapse(op: LogicalOp, mut children: Vec<ConditionGroup>) -> ConditionGroup {
    if children.len() == 1 {
        return children.remove(0);
    }
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match child {
            ConditionGroup::Combinator {
                op: inner,
                children: nested,
            } if inner == op => flat.extend(nested),
            other => flat.push(other),
        }
    }
    ConditionGroup::Combinator { op, children: flat }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_equality() {
        let expr = parse("location == 'EMPAC'").unwrap();
        assert_eq!(
            expr,
            ConditionGroup::compare("location", CompareOp::Eq, Literal::Text("EMPAC".into()))
        );
    }

    #[test]
    fn test_parse_numeric_comparisons() {
        let cases = [
            ("expected_attendance > 100", CompareOp::Gt),
            ("expected_attendance >= 100", CompareOp::Gte),
            ("expected_attendance < 100", CompareOp::Lt),
            ("expected_attendance <= 100", CompareOp::Lte),
            ("expected_attendance != 100", CompareOp::Neq),
        ];
        for (input, op) in cases {
            assert_eq!(
                parse(input).unwrap(),
                ConditionGroup::compare("expected_attendance", op, Literal::Integer(100)),
                "{}",
                input
            );
        }
    }

    #[test]
    fn test_parse_negative_number() {
        let expr = parse("balance > -5").unwrap();
        assert_eq!(
            expr,
            ConditionGroup::compare("balance", CompareOp::Gt, Literal::Integer(-5))
        );
    }

    #[test]
    fn test_parse_boolean_literal() {
        let expr = parse("has_external_link == false").unwrap();
        assert_eq!(
            expr,
            ConditionGroup::compare("has_external_link", CompareOp::Eq, Literal::Boolean(false))
        );
    }

    #[test]
    fn test_parse_contains_variants() {
        assert_eq!(
            parse("location contains 'Hall'").unwrap(),
            ConditionGroup::compare("location", CompareOp::Contains, "Hall".into())
        );
        assert_eq!(
            parse("location not contains \"Hall\"").unwrap(),
            ConditionGroup::compare("location", CompareOp::NotContains, "Hall".into())
        );
    }

    #[test]
    fn test_parse_in_list() {
        let expr = parse("visibility not in ['private', 'restricted']").unwrap();
        assert_eq!(
            expr,
            ConditionGroup::compare(
                "visibility",
                CompareOp::NotIn,
                Literal::List(vec!["private".into(), "restricted".into()])
            )
        );
        assert_eq!(
            parse("expected_attendance in []").unwrap(),
            ConditionGroup::compare("expected_attendance", CompareOp::In, Literal::List(vec![]))
        );
    }

    #[test]
    fn test_parse_date_operators() {
        assert_eq!(
            parse("starts_on before '2026-06-01'").unwrap(),
            ConditionGroup::compare("starts_on", CompareOp::Before, "2026-06-01".into())
        );
        assert_eq!(
            parse("starts_on after \"2026-06-01\"").unwrap(),
            ConditionGroup::compare("starts_on", CompareOp::After, "2026-06-01".into())
        );
        assert_eq!(
            parse("starts_on between ['2026-01-01', '2026-05-31']").unwrap(),
            ConditionGroup::compare(
                "starts_on",
                CompareOp::Between,
                Literal::List(vec!["2026-01-01".into(), "2026-05-31".into()])
            )
        );
    }

    #[test]
    fn test_apostrophe_round_trips_through_parse() {
        let expr = parse("location == \"O'Brien Hall\" or location in [\"Lally's\", 'DCC']").unwrap();
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn test_and_chain_collapses() {
        let expr = parse("a == 1 and b == 2 and c == 3").unwrap();
        match expr {
            ConditionGroup::Combinator {
                op: LogicalOp::And,
                children,
            } => assert_eq!(children.len(), 3),
            other => panic!("Expected And combinator, got {:?}", other),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a == 1 or b == 2 and c == 3").unwrap();
        assert_eq!(
            expr,
            ConditionGroup::any(vec![
                ConditionGroup::compare("a", CompareOp::Eq, 1.into()),
                ConditionGroup::all(vec![
                    ConditionGroup::compare("b", CompareOp::Eq, 2.into()),
                    ConditionGroup::compare("c", CompareOp::Eq, 3.into()),
                ]),
            ])
        );
    }

    #[test]
    fn test_parentheses_and_not() {
        let expr = parse("not (a == 1 or b == 2)").unwrap();
        assert_eq!(
            expr,
            ConditionGroup::negate(ConditionGroup::any(vec![
                ConditionGroup::compare("a", CompareOp::Eq, 1.into()),
                ConditionGroup::compare("b", CompareOp::Eq, 2.into()),
            ]))
        );
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let source = "expected_attendance > 100 and not (location in ['DCC', 'EMPAC'])";
        let expr = parse(source).unwrap();
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse("this is not valid").is_err());
        assert!(parse("location = 'x'").is_err());
        assert!(parse("location == 'unterminated").is_err());
        assert!(parse("(a == 1").is_err());
        assert!(parse("a == 1 b == 2").is_err());
        assert!(parse("").is_err());
    }
}
