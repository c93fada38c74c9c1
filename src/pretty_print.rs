use crate::evaluator::MAX_EVAL_DEPTH;
use crate::parser::MAX_NESTING;
use crate::{EnvError, Error, EvalError, LexError, ParseError};
use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use std::io;

// Spans are byte offsets; ariadne counts chars unless told otherwise.
fn config() -> Config {
    Config::default().with_index_type(IndexType::Byte)
}

impl Error {
    /// Writes a source-annotated report of this error to stderr.
    /// `name` labels the source, e.g. a file path or "REPL".
    pub fn pretty_print(&self, name: &str, input: &str) -> io::Result<()> {
        match self {
            Error::Lex(lex_err) => lex_err.pretty_print(name, input),
            Error::Parse(parse_err) => parse_err.pretty_print(name, input),
            Error::Eval { error, .. } => error.pretty_print(name, input),
        }
    }
}

impl LexError {
    pub fn pretty_print(&self, name: &str, input: &str) -> io::Result<()> {
        let range = self.span.to_range();
        Report::build(ReportKind::Error, (name, range.clone()))
            .with_config(config())
            .with_message("Lexer Error")
            .with_label(
                Label::new((name, range))
                    .with_message(format!("Unexpected character '{}'", self.character)),
            )
            .finish()
            .eprint((name, Source::from(input)))
    }
}

impl ParseError {
    pub fn pretty_print(&self, name: &str, input: &str) -> io::Result<()> {
        let report = match self {
            ParseError::UnexpectedToken { found, expected } => {
                Report::build(ReportKind::Error, (name, found.span.to_range()))
                    .with_message(format!("Unexpected {}: {}", found.kind, found.text))
                    .with_label(
                        Label::new((name, found.span.to_range()))
                            .with_message(format!("Expected {}", expected)),
                    )
            }
            ParseError::UnexpectedEof(expected) => {
                let end = input.len();
                Report::build(ReportKind::Error, (name, end..end))
                    .with_message("Unexpected end of input")
                    .with_label(
                        Label::new((name, end..end))
                            .with_message(format!("Expected {}", expected)),
                    )
            }
            ParseError::MissingCloseParen(open) => {
                Report::build(ReportKind::Error, (name, open.to_range()))
                    .with_message("Missing closing parenthesis")
                    .with_label(
                        Label::new((name, open.to_range()))
                            .with_message("This '(' is never closed"),
                    )
            }
            ParseError::IntegerOverflow(text, span) => {
                Report::build(ReportKind::Error, (name, span.to_range()))
                    .with_message(format!("Integer literal too large: {}", text))
                    .with_label(
                        Label::new((name, span.to_range()))
                            .with_message("Integers must fit in 64 bits"),
                    )
            }
            ParseError::TooDeep(open) => {
                Report::build(ReportKind::Error, (name, open.to_range()))
                    .with_message("Lists nested too deeply")
                    .with_label(
                        Label::new((name, open.to_range()))
                            .with_message(format!("Limit is {} levels", MAX_NESTING)),
                    )
            }
        };
        report
            .with_config(config())
            .finish()
            .eprint((name, Source::from(input)))
    }
}

impl EvalError {
    pub fn pretty_print(&self, name: &str, input: &str) -> io::Result<()> {
        let range = self.span().to_range();
        let (message, label) = match self {
            EvalError::EnvError(EnvError::UnboundVariable(symbol, _)) => (
                format!("Unbound symbol `{}`", symbol),
                "This symbol is not defined in the current scope".to_string(),
            ),
            EvalError::Arity {
                name: callee,
                expected,
                found,
                ..
            } => (
                format!("Wrong number of arguments to {}", callee),
                format!("Expected {} argument(s), got {}", expected, found),
            ),
            EvalError::TypeMismatch {
                name: callee,
                expected,
                found,
                ..
            } => (
                format!("Type mismatch in {}", callee),
                format!("Expected {}, found {}", expected, found),
            ),
            EvalError::NotAProcedure(value, _) => (
                format!("Not a procedure: {}", value),
                format!("A {} cannot be called as a procedure", value.type_name()),
            ),
            EvalError::MalformedForm(message, _) => {
                ("Malformed special form".to_string(), message.clone())
            }
            EvalError::Arithmetic(message, _) => ("Arithmetic error".to_string(), message.clone()),
            EvalError::TooDeep(_) => (
                "Evaluation nested too deeply".to_string(),
                format!("Gave up here after {} nested evaluations", MAX_EVAL_DEPTH),
            ),
        };
        Report::build(ReportKind::Error, (name, range.clone()))
            .with_config(config())
            .with_message(message)
            .with_label(Label::new((name, range)).with_message(label))
            .finish()
            .eprint((name, Source::from(input)))
    }
}
