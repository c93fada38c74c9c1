// Declare modules publicly so they are part of the library interface
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod source;
pub mod types;

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

pub use environment::{EnvError, Environment, create_global_environment};
pub use evaluator::{EvalError, EvalResult, evaluate};
pub use lexer::{LexError, Token, TokenKind, tokenize};
pub use parser::{ParseError, Parser, parse};
pub use source::Span;
pub use types::{Expr, Node, Procedure, Value};

/// Any failure of the lex → parse → evaluate pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Evaluation stopped at a top-level expression. `completed` holds the
    /// values of the expressions before it, in source order.
    #[error("eval error: {error}")]
    Eval {
        #[source]
        error: EvalError,
        completed: Vec<Value>,
    },
}

/// Lexes and parses `input` without evaluating it.
pub fn parse_str(input: &str) -> Result<Vec<Node>, Error> {
    let tokens = tokenize(input)?;
    Ok(parse(tokens)?)
}

/// Runs `source` in a fresh global environment and returns the value of
/// each top-level expression.
pub fn run(source: &str) -> Result<Vec<Value>, Error> {
    run_in(source, create_global_environment())
}

/// Like [`run`], but against a caller-owned environment so state can carry
/// over between calls (the REPL keeps one for the whole session).
pub fn run_in(source: &str, env: Rc<RefCell<Environment>>) -> Result<Vec<Value>, Error> {
    let tokens = tokenize(source)?;
    debug!(
        tokens = ?tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(),
        "tokenized"
    );

    let program = parse(tokens)?;
    debug!(
        forms = ?program.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
        "parsed"
    );

    let mut results = Vec::with_capacity(program.len());
    for node in &program {
        debug!(%node, "evaluating");
        match evaluate(node, env.clone()) {
            Ok(value) => {
                debug!(%value, "evaluated");
                results.push(value);
            }
            Err(error) => {
                return Err(Error::Eval {
                    error,
                    completed: results,
                });
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_one(input: &str) -> Value {
        match run(input) {
            Ok(mut values) if values.len() == 1 => values.remove(0),
            other => panic!("Expected one value for '{}', got {:?}", input, other),
        }
    }

    #[test]
    fn test_integers_evaluate_to_themselves() {
        for n in [0i64, 1, 7, 42, 1_000_000, i64::MAX] {
            assert_eq!(run_one(&n.to_string()), Value::Integer(n));
        }
    }

    #[test]
    fn test_sum_matches_arithmetic_sum() {
        let cases: [&[i64]; 4] = [&[], &[5], &[1, 2, 3], &[100, 0, 250, 3, 9999]];
        for case in cases {
            let source = format!(
                "(+ {})",
                case.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" ")
            );
            assert_eq!(run_one(&source), Value::Integer(case.iter().sum()));
        }
    }

    #[test]
    fn test_run_multiple_expressions_in_order() {
        assert_eq!(
            run(r#"1 (+ 1 1) "three""#),
            Ok(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::String("three".to_string())
            ])
        );
        assert_eq!(run(""), Ok(vec![]));
    }

    #[test]
    fn test_run_stages_fail_fast() {
        assert!(matches!(run("(+ 1 #)"), Err(Error::Lex(_))));
        // A parse error means nothing was evaluated, not even the valid prefix
        assert!(matches!(run("(print 1) (+ 1"), Err(Error::Parse(_))));
        assert!(matches!(run(")"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_eval_error_keeps_completed_results() {
        match run("1 2 (undefined) 4") {
            Err(Error::Eval { error, completed }) => {
                assert!(matches!(error, EvalError::EnvError(_)));
                assert_eq!(completed, vec![Value::Integer(1), Value::Integer(2)]);
            }
            other => panic!("expected eval error, got {:?}", other),
        }
    }

    #[test]
    fn test_run_in_keeps_environment() {
        let env = create_global_environment();
        env.borrow_mut().define("answer".to_string(), Value::Integer(42));
        assert_eq!(run_in("(+ answer 1)", env.clone()), Ok(vec![Value::Integer(43)]));
        assert_eq!(run_in("answer", env), Ok(vec![Value::Integer(42)]));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            run("x").unwrap_err().to_string(),
            "eval error: unbound variable: 'x'"
        );
        assert_eq!(
            run("(").unwrap_err().to_string(),
            "parse error: missing closing parenthesis for list opened at 0..1"
        );
    }

    #[test]
    fn test_deep_nesting_is_reported() {
        let input = format!("{}{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(matches!(run(&input), Err(Error::Parse(ParseError::TooDeep(_)))));
        assert!(matches!(parse_str(&input), Err(Error::Parse(ParseError::TooDeep(_)))));
    }

    #[test]
    fn test_parse_str() {
        let nodes = parse_str("(a b) c").unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(matches!(parse_str("@"), Err(Error::Lex(_))));
    }

    #[test]
    fn test_reference_programs() {
        assert_eq!(run_one("(+ 1 (* 2 3))"), Value::Integer(7));
        assert_eq!(run_one("(- 5)"), Value::Integer(-5));
        assert_eq!(run_one("(/ 10 2)"), Value::Float(5.0));
        assert_eq!(
            run_one("(let ((x 1)) (let ((f (lambda () x))) (let ((x 2)) (f))))"),
            Value::Integer(1)
        );
        assert_eq!(run_one("(if (> 3 2) 10 20)"), Value::Integer(10));
        assert_eq!(run_one("(if (> 2 3) 10 20)"), Value::Integer(20));
        assert_eq!(run_one("(for i 1 3 i)"), Value::Integer(3));
    }
}
