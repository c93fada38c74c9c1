use crate::environment::Environment;
use crate::evaluator::EvalResult;
use crate::source::Span;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A parsed expression together with the source span it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: Expr,
    pub span: Span,
}

impl Node {
    pub fn new(kind: Expr, span: Span) -> Self {
        Node { kind, span }
    }

    pub fn new_integer(n: i64, span: Span) -> Self {
        Node::new(Expr::Integer(n), span)
    }

    pub fn new_string(s: &str, span: Span) -> Self {
        Node::new(Expr::String(s.to_string()), span)
    }

    pub fn new_symbol(name: &str, span: Span) -> Self {
        Node::new(Expr::Symbol(name.to_string()), span)
    }

    pub fn new_list(elements: Vec<Node>, span: Span) -> Self {
        Node::new(Expr::List(elements), span)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Code as the parser produces it. Nothing here is ever evaluated in place;
/// the evaluator turns it into a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer(i64),
    String(String),  // Quotes stripped, escapes resolved
    Symbol(String),  // Operators land here too: +, <=, ...
    List(Vec<Node>), // (f a b), (if c t e), or ()
}

impl Expr {
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Integer(n) => write!(f, "{}", n),
            Expr::String(s) => write_quoted(f, s),
            Expr::Symbol(name) => write!(f, "{}", name),
            Expr::List(elements) => {
                write!(f, "(")?;
                for (i, node) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", node)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(
        f,
        "\"{}\"",
        s.chars().fold(String::new(), |mut acc, c| {
            match c {
                '"' => acc.push_str("\\\""),
                '\\' => acc.push_str("\\\\"),
                '\n' => acc.push_str("\\n"),
                '\r' => acc.push_str("\\r"),
                '\t' => acc.push_str("\\t"),
                c => acc.push(c),
            }
            acc
        })
    )
}

/// The result of evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    Procedure(Procedure),
    Nil, // What `()` evaluates to
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::List(_) => "list",
            Value::Procedure(_) => "procedure",
            Value::Nil => "empty list",
        }
    }

    /// Only `false` and the empty list are falsy. An empty list built at
    /// runtime counts as the empty list, just like `()`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(false) | Value::Nil => false,
            Value::List(items) => !items.is_empty(),
            _ => true,
        }
    }

    // Strings nested in a list are shown quoted, top-level ones are not.
    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write_quoted(f, s),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x), // Keeps the trailing ".0"
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    item.fmt_nested(f)?;
                }
                write!(f, ")")
            }
            Value::Procedure(procedure) => write!(f, "{}", procedure),
            Value::Nil => write!(f, "()"),
        }
    }
}

pub type PrimitiveFunc = fn(Vec<Value>, Span) -> EvalResult;

#[derive(Clone)]
pub enum Procedure {
    Primitive(PrimitiveFunc, &'static str), // The function pointer and its registry name
    Lambda(Rc<Lambda>),
}

/// A closure created by `(lambda (params...) body)`.
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Node,
    pub env: Rc<RefCell<Environment>>, // Defining environment, shared
}

impl Procedure {
    pub fn name(&self) -> &str {
        match self {
            Procedure::Primitive(_, name) => name,
            Procedure::Lambda(_) => "lambda",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "#<builtin:{}>", name),
            Procedure::Lambda(lambda) => write!(f, "#<lambda ({})>", lambda.params.join(" ")),
        }
    }
}

// The captured environment is left out: it may hold this very procedure.
impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "Primitive({})", name),
            Procedure::Lambda(lambda) => {
                write!(f, "Lambda({:?}, {})", lambda.params, lambda.body)
            }
        }
    }
}

// Builtins compare by name, closures by identity.
impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(_, n1), Procedure::Primitive(_, n2)) => n1 == n2,
            (Procedure::Lambda(l1), Procedure::Lambda(l2)) => Rc::ptr_eq(l1, l2),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_display_round_trips_source_shape() {
        let node = Node::new_list(
            vec![
                Node::new_symbol("concat", Span::default()),
                Node::new_string("say \"hi\"\n", Span::default()),
                Node::new_list(vec![], Span::default()),
                Node::new_integer(42, Span::default()),
            ],
            Span::default(),
        );
        assert_eq!(node.to_string(), r#"(concat "say \"hi\"\n" () 42)"#);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::Float(5.0).to_string(), "5.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::String("plain".into()).to_string(), "plain");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Nil.to_string(), "()");
        assert_eq!(
            Value::List(vec![
                Value::Integer(1),
                Value::String("two".into()),
                Value::List(vec![]),
            ])
            .to_string(),
            r#"(1 "two" ())"#
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Nil.is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::String(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::List(vec![Value::Nil]).is_truthy());
    }
}
