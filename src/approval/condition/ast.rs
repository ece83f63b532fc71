// SPDX-License-Identifier: MIT

//! Expression tree for step conditions

use serde::{Deserialize, Serialize};
use std::fmt;

/// A condition expression over event attributes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ConditionGroup {
    /// Comparison expression: field op value
    Comparison {
        field: String,
        operator: CompareOp,
        value: Literal,
    },
    /// Logical combination of child conditions
    Combinator {
        op: LogicalOp,
        children: Vec<ConditionGroup>,
    },
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// ==
    Eq,
    /// !=
    Neq,
    /// >
    Gt,
    /// >=
    Gte,
    /// <
    Lt,
    /// <=
    Lte,
    /// substring match on text
    Contains,
    NotContains,
    /// membership in a literal list
    In,
    NotIn,
    /// date comparisons; `between` takes `[from, to]`, both inclusive
    Before,
    After,
    Between,
}

/// Logical combinators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
    #[serde(alias = "NOT")]
    Not,
}

/// Literal values in expressions
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Text(String),
    List(Vec<Literal>),
}

impl ConditionGroup {
    pub fn compare(field: impl Into<String>, operator: CompareOp, value: Literal) -> Self {
        ConditionGroup::Comparison {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn all(children: Vec<ConditionGroup>) -> Self {
        ConditionGroup::Combinator {
            op: LogicalOp::And,
            children,
        }
    }

    pub fn any(children: Vec<ConditionGroup>) -> Self {
        ConditionGroup::Combinator {
            op: LogicalOp::Or,
            children,
        }
    }

    pub fn negate(child: ConditionGroup) -> Self {
        ConditionGroup::Combinator {
            op: LogicalOp::Not,
            children: vec![child],
        }
    }

    /// Every field name referenced anywhere in the tree
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_fields(self, &mut out);
        out
    }
}

fn collect_fields<'a>(node: &'a ConditionGroup, out: &mut Vec<&'a str>) {
    match node {
        ConditionGroup::Comparison { field, .. } => out.push(field),
        ConditionGroup::Combinator { children, .. } => {
            for child in children {
                collect_fields(child, out);
            }
        }
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Integer(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Boolean(b)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Text(s.to_string())
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Neq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::Contains => write!(f, "contains"),
            CompareOp::NotContains => write!(f, "not contains"),
            CompareOp::In => write!(f, "in"),
            CompareOp::NotIn => write!(f, "not in"),
            CompareOp::Before => write!(f, "before"),
            CompareOp::After => write!(f, "after"),
            CompareOp::Between => write!(f, "between"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Text(s) if s.contains('\'') => write!(f, "\"{}\"", s),
            Literal::Text(s) => write!(f, "'{}'", s),
            Literal::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Renders the tree back into the text form accepted by `parse`
impl fmt::Display for ConditionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionGroup::Comparison {
                field,
                operator,
                value,
            } => write!(f, "{} {} {}", field, operator, value),
            ConditionGroup::Combinator {
                op: LogicalOp::Not,
                children,
            } => {
                write!(f, "not (")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            ConditionGroup::Combinator { op, children } => {
                let joiner = if *op == LogicalOp::And { " and " } else { " or " };
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", joiner)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}
