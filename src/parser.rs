use crate::Span;
use crate::lexer::{Token, TokenKind};
use crate::types::{Expr, Node};
use std::iter::Peekable;
use std::vec::IntoIter; // To iterate over Vec<Token>
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected token '{}' at {}, expected {expected}", .found.text, .found.span)]
    UnexpectedToken { found: Token, expected: String },
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(String),
    #[error("missing closing parenthesis for list opened at {0}")]
    MissingCloseParen(Span), // Span of the unmatched '('
    #[error("integer literal '{0}' does not fit in 64 bits")]
    IntegerOverflow(String, Span),
    #[error("lists nested more than {max} deep at {0}", max = MAX_NESTING)]
    TooDeep(Span), // Span of the '(' that went over the limit
}

/// How deeply lists may nest before parsing gives up.
pub const MAX_NESTING: usize = 1024;

pub type ParseResult<T> = Result<T, ParseError>;

/// Recursive-descent parser with one token of lookahead.
pub struct Parser {
    tokens: Peekable<IntoIter<Token>>,
    depth: usize, // Lists currently open
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
            depth: 0,
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    fn peek_token(&mut self) -> Option<&Token> {
        self.tokens.peek()
    }

    /// Parses a single expression starting at the next token.
    pub fn parse_expr(&mut self) -> ParseResult<Node> {
        match self.next_token() {
            Some(Token {
                kind: TokenKind::LParen,
                span,
                ..
            }) => {
                if self.depth >= MAX_NESTING {
                    return Err(ParseError::TooDeep(span));
                }
                self.depth += 1;
                let list = self.parse_list(span);
                self.depth -= 1;
                list
            }
            Some(Token {
                kind: TokenKind::RParen,
                text,
                span,
            }) => Err(ParseError::UnexpectedToken {
                found: Token::new(TokenKind::RParen, text, span),
                expected: "an expression".to_string(),
            }),
            Some(atom) => self.parse_atom(atom),
            None => Err(ParseError::UnexpectedEof("an expression".to_string())),
        }
    }

    fn parse_atom(&mut self, token: Token) -> ParseResult<Node> {
        let kind = match token.kind {
            TokenKind::Integer => match token.text.parse::<i64>() {
                Ok(n) => Expr::Integer(n),
                // The lexer only emits digit runs, so this is always overflow
                Err(_) => return Err(ParseError::IntegerOverflow(token.text, token.span)),
            },
            TokenKind::StringLiteral => Expr::String(unescape(strip_quotes(&token.text))),
            TokenKind::Operator | TokenKind::Symbol => Expr::Symbol(token.text),
            TokenKind::LParen | TokenKind::RParen => {
                return Err(ParseError::UnexpectedToken {
                    found: token,
                    expected: "an atom (integer, string, operator, symbol)".to_string(),
                });
            }
        };
        Ok(Node::new(kind, token.span))
    }

    /// Parses the elements of a list whose '(' has already been consumed.
    fn parse_list(&mut self, open: Span) -> ParseResult<Node> {
        let mut elements = Vec::new();
        loop {
            match self.peek_token() {
                Some(Token {
                    kind: TokenKind::RParen,
                    span,
                    ..
                }) => {
                    let span = open.merge(*span);
                    self.next_token();
                    return Ok(Node::new_list(elements, span));
                }
                Some(_) => elements.push(self.parse_expr()?),
                None => return Err(ParseError::MissingCloseParen(open)),
            }
        }
    }

    /// Parses every top-level expression until the tokens run out.
    pub fn parse(mut self) -> ParseResult<Vec<Node>> {
        let mut expressions = Vec::new();
        while self.peek_token().is_some() {
            expressions.push(self.parse_expr()?);
        }
        Ok(expressions)
    }
}

pub fn parse(tokens: Vec<Token>) -> ParseResult<Vec<Node>> {
    Parser::new(tokens).parse()
}

fn strip_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text)
}

// Unknown escapes are kept as written, backslash included.
fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_input(input: &str) -> ParseResult<Vec<Node>> {
        let tokens = tokenize(input).expect("lexing should succeed");
        parse(tokens)
    }

    // Compare through Display so spans don't get in the way
    fn assert_parsed(input: &str, expected: &[&str]) {
        match parse_input(input) {
            Ok(nodes) => {
                let shown: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
                assert_eq!(shown, expected, "Input: '{}'", input);
            }
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        }
    }

    fn assert_parse_error(input: &str, expected_error_variant: ParseError) {
        match parse_input(input) {
            Ok(result) => panic!(
                "Expected parsing to fail for input '{}', but got: {:?}",
                input, result
            ),
            Err(e) => {
                assert_eq!(
                    std::mem::discriminant(&e),
                    std::mem::discriminant(&expected_error_variant),
                    "Input: '{}', Expected error variant like {:?}, got: {:?}",
                    input,
                    expected_error_variant,
                    e
                );
            }
        }
    }

    fn node_integer(n: i64, start: usize, end: usize) -> Node {
        Node::new_integer(n, Span::new(start, end))
    }

    fn node_symbol(s: &str, start: usize, end: usize) -> Node {
        Node::new_symbol(s, Span::new(start, end))
    }

    fn node_list(nodes: Vec<Node>, start: usize, end: usize) -> Node {
        Node::new_list(nodes, Span::new(start, end))
    }

    #[test]
    fn test_parse_empty_input() {
        assert_eq!(parse(vec![]), Ok(vec![]));
        assert_parsed("   ", &[]);
    }

    #[test]
    fn test_parse_atoms() {
        assert_eq!(parse_input("42"), Ok(vec![node_integer(42, 0, 2)]));
        assert_eq!(parse_input("x"), Ok(vec![node_symbol("x", 0, 1)]));
        assert_eq!(parse_input("<="), Ok(vec![node_symbol("<=", 0, 2)]));
        assert_eq!(
            parse_input(r#""hello world""#),
            Ok(vec![Node::new_string("hello world", Span::new(0, 13))])
        );
    }

    #[test]
    fn test_parse_string_escapes() {
        let nodes = parse_input(r#""a\"b\\c\nd\qe""#).unwrap();
        assert_eq!(nodes[0].kind, Expr::String("a\"b\\c\nd\\qe".to_string()));
    }

    #[test]
    fn test_parse_simple_list_with_spans() {
        assert_eq!(
            parse_input("(+ 10 20)"),
            Ok(vec![node_list(
                vec![
                    node_symbol("+", 1, 2),
                    node_integer(10, 3, 5),
                    node_integer(20, 6, 8),
                ],
                0,
                9
            )])
        );
    }

    #[test]
    fn test_parse_empty_list() {
        assert_eq!(parse_input("()"), Ok(vec![node_list(vec![], 0, 2)]));
        assert_eq!(parse_input("( )"), Ok(vec![node_list(vec![], 0, 3)]));
    }

    #[test]
    fn test_parse_nested_list() {
        assert_parsed("(+ 1 (* 2 3))", &["(+ 1 (* 2 3))"]);
        assert_parsed("(+ (* 2 3) (- 10 5))", &["(+ (* 2 3) (- 10 5))"]);
        assert_parsed("(()())", &["(() ())"]);
        assert_parsed(
            "(let ((x 1) (y \"two\")) (concat x y))",
            &["(let ((x 1) (y \"two\")) (concat x y))"],
        );
    }

    #[test]
    fn test_parse_multiple_expressions() {
        assert_parsed("42 (+ 1 2) x", &["42", "(+ 1 2)", "x"]);
        assert_parsed("(a)\n(b)\n", &["(a)", "(b)"]);
    }

    #[test]
    fn test_error_missing_close_paren() {
        assert_parse_error("(", ParseError::MissingCloseParen(Span::default()));
        assert_parse_error("(+ 1 2", ParseError::MissingCloseParen(Span::default()));
        assert_parse_error("(a (b c)", ParseError::MissingCloseParen(Span::default()));
        // The span points at the '(' left open
        assert_eq!(
            parse_input("(a (b c)"),
            Err(ParseError::MissingCloseParen(Span::new(0, 1)))
        );
    }

    #[test]
    fn test_error_unmatched_close_paren() {
        let dummy = ParseError::UnexpectedToken {
            found: Token::new(TokenKind::RParen, ")", Span::default()),
            expected: String::new(),
        };
        assert_parse_error(")", dummy.clone());
        assert_parse_error("(+ 1 2))", dummy.clone());
        assert_parse_error("1 ) 2", dummy);
    }

    #[test]
    fn test_error_integer_overflow() {
        assert_parse_error(
            "99999999999999999999",
            ParseError::IntegerOverflow(String::new(), Span::default()),
        );
        assert_parsed("9223372036854775807", &["9223372036854775807"]);
    }

    #[test]
    fn test_parse_expr_at_eof() {
        let mut parser = Parser::new(vec![]);
        assert!(matches!(parser.parse_expr(), Err(ParseError::UnexpectedEof(_))));
    }

    #[test]
    fn test_balanced_input_always_parses() {
        let inputs = [
            "(((((1)))))",
            "(a (b (c (d))) e)",
            "(lambda (x y) (+ x y))",
            "(for i 1 10 (print i)) (list)",
        ];
        for input in inputs {
            assert!(parse_input(input).is_ok(), "Input: '{}'", input);
        }
    }

    fn nested(depth: usize) -> String {
        format!("{}{}", "(".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn test_nesting_up_to_limit_parses() {
        let nodes = parse_input(&nested(MAX_NESTING)).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].span, Span::new(0, 2 * MAX_NESTING));
    }

    #[test]
    fn test_nesting_past_limit_is_an_error() {
        // The span is the first '(' beyond the limit
        assert_eq!(
            parse_input(&nested(MAX_NESTING + 1)),
            Err(ParseError::TooDeep(Span::new(MAX_NESTING, MAX_NESTING + 1)))
        );
        assert_parse_error(&nested(5_000), ParseError::TooDeep(Span::default()));
    }

    #[test]
    fn test_depth_resets_between_expressions() {
        let input = format!("{} {}", nested(MAX_NESTING), nested(MAX_NESTING));
        assert_eq!(parse_input(&input).map(|nodes| nodes.len()), Ok(2));
    }
}
