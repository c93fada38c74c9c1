use crate::environment::{EnvError, Environment};
use crate::source::Span;
use crate::types::{Expr, Lambda, Node, Procedure, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use thiserror::Error;
use tracing::trace;

// --- Evaluation Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    EnvError(#[from] EnvError),
    #[error("'{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
        span: Span,
    },
    #[error("type mismatch in '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: &'static str,
        span: Span,
    },
    #[error("not a procedure: {0}")]
    NotAProcedure(Value, Span),
    #[error("malformed special form: {0}")]
    MalformedForm(String, Span),
    #[error("arithmetic error: {0}")]
    Arithmetic(String, Span),
    #[error("evaluation nested more than {} deep", MAX_EVAL_DEPTH)]
    TooDeep(Span),
}

impl EvalError {
    pub fn span(&self) -> Span {
        match self {
            EvalError::EnvError(EnvError::UnboundVariable(_, span)) => *span,
            EvalError::Arity { span, .. } | EvalError::TypeMismatch { span, .. } => *span,
            EvalError::NotAProcedure(_, span)
            | EvalError::MalformedForm(_, span)
            | EvalError::Arithmetic(_, span)
            | EvalError::TooDeep(span) => *span,
        }
    }
}

pub type EvalResult<T = Value> = Result<T, EvalError>;

/// Keywords the evaluator handles itself instead of calling a procedure.
pub const SPECIAL_FORMS: &[&str] = &["if", "let", "for", "lambda", "and", "or"];

pub fn special_form_identifiers() -> HashSet<String> {
    SPECIAL_FORMS.iter().map(|s| s.to_string()).collect()
}

/// How many list evaluations may be in progress at once on one thread.
/// Deeper programs fail with `EvalError::TooDeep` instead of exhausting the
/// native stack.
pub const MAX_EVAL_DEPTH: usize = 1024;

thread_local! {
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

// Counts one level of list evaluation for as long as it is alive.
struct DepthGuard;

impl DepthGuard {
    fn enter(span: Span) -> EvalResult<DepthGuard> {
        EVAL_DEPTH.with(|depth| {
            if depth.get() >= MAX_EVAL_DEPTH {
                return Err(EvalError::TooDeep(span));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Evaluates a given AST Node within the specified environment.
pub fn evaluate(node: &Node, env: Rc<RefCell<Environment>>) -> EvalResult {
    match &node.kind {
        Expr::Integer(n) => Ok(Value::Integer(*n)),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Symbol(name) => Ok(env.borrow().lookup(name, node.span)?),
        Expr::List(elements) => match elements.as_slice() {
            [] => Ok(Value::Nil),
            [first, rest @ ..] => {
                let _guard = DepthGuard::enter(node.span)?;
                match first.kind.as_symbol() {
                    Some("if") => evaluate_if(rest, env, node.span),
                    Some("let") => evaluate_let(rest, env, node.span),
                    Some("for") => evaluate_for(rest, env, node.span),
                    Some("lambda") => evaluate_lambda(rest, env, node.span),
                    Some("and") => evaluate_and_or(rest, env, node.span, true),
                    Some("or") => evaluate_and_or(rest, env, node.span, false),
                    _ => evaluate_procedure(first, rest, env, node.span),
                }
            }
        },
    }
}

fn evaluate_procedure(
    operator: &Node,
    operands: &[Node],
    env: Rc<RefCell<Environment>>,
    span: Span,
) -> EvalResult {
    let procedure = match evaluate(operator, env.clone())? {
        Value::Procedure(procedure) => procedure,
        other => return Err(EvalError::NotAProcedure(other, operator.span)),
    };

    let mut evaluated_args = Vec::with_capacity(operands.len());
    for operand in operands {
        evaluated_args.push(evaluate(operand, env.clone())?);
    }

    apply(&procedure, evaluated_args, span)
}

/// Calls `procedure` with already evaluated arguments. `span` is the call
/// site, used for any error the call raises.
pub fn apply(procedure: &Procedure, args: Vec<Value>, span: Span) -> EvalResult {
    match procedure {
        Procedure::Primitive(func, _) => func(args, span),
        Procedure::Lambda(lambda) => {
            if args.len() != lambda.params.len() {
                return Err(EvalError::Arity {
                    name: procedure.name().to_string(),
                    expected: format!("exactly {}", lambda.params.len()),
                    found: args.len(),
                    span,
                });
            }
            let frame = Environment::new_enclosed(lambda.env.clone());
            {
                let mut frame = frame.borrow_mut();
                for (param, arg) in lambda.params.iter().zip(args) {
                    frame.define(param.clone(), arg);
                }
            }
            evaluate(&lambda.body, frame)
        }
    }
}

// (if condition consequent alternate)
fn evaluate_if(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    let [condition, consequent, alternate] = operands else {
        return Err(EvalError::MalformedForm(
            format!(
                "if expects condition, consequent and alternate, got {} operand(s)",
                operands.len()
            ),
            span,
        ));
    };
    trace!(%condition, "if");
    if evaluate(condition, env.clone())?.is_truthy() {
        evaluate(consequent, env)
    } else {
        evaluate(alternate, env)
    }
}

// (let ((name expr) ...) body...)
fn evaluate_let(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    let [bindings, body @ ..] = operands else {
        return Err(EvalError::MalformedForm(
            "let expects a binding list and a body".to_string(),
            span,
        ));
    };
    if body.is_empty() {
        return Err(EvalError::MalformedForm(
            "let expects at least one body expression".to_string(),
            span,
        ));
    }
    let Expr::List(bindings) = &bindings.kind else {
        return Err(EvalError::MalformedForm(
            format!("let bindings must be a list, got {}", bindings),
            bindings.span,
        ));
    };

    // All values are computed in the outer scope before any name is bound.
    let mut values = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let (name, expr) = let_binding(binding)?;
        values.push((name.to_string(), evaluate(expr, env.clone())?));
    }
    trace!(bindings = values.len(), "let");

    let local = Environment::new_enclosed(env);
    {
        let mut frame = local.borrow_mut();
        for (name, value) in values {
            frame.define(name, value);
        }
    }

    let mut result = Value::Nil;
    for expr in body {
        result = evaluate(expr, local.clone())?;
    }
    Ok(result)
}

fn let_binding(binding: &Node) -> EvalResult<(&str, &Node)> {
    if let Expr::List(pair) = &binding.kind {
        if let [name, expr] = pair.as_slice() {
            return match name.kind.as_symbol() {
                Some(name) => Ok((name, expr)),
                None => Err(EvalError::MalformedForm(
                    format!("let binding name must be a symbol, got {}", name),
                    name.span,
                )),
            };
        }
    }
    Err(EvalError::MalformedForm(
        format!("let binding must be (name value), got {}", binding),
        binding.span,
    ))
}

// (for var start end body), end inclusive
fn evaluate_for(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    let [var, start, end, body] = operands else {
        return Err(EvalError::MalformedForm(
            format!(
                "for expects a variable, start, end and body, got {} operand(s)",
                operands.len()
            ),
            span,
        ));
    };
    let Some(var) = var.kind.as_symbol() else {
        return Err(EvalError::MalformedForm(
            format!("for variable must be a symbol, got {}", var),
            var.span,
        ));
    };
    let start = expect_integer(evaluate(start, env.clone())?, start.span)?;
    let end = expect_integer(evaluate(end, env.clone())?, end.span)?;
    trace!(var, start, end, "for");

    // One frame for the whole loop; each iteration rebinds the variable.
    let local = Environment::new_enclosed(env);
    let mut result = Value::Nil;
    for i in start..=end {
        local.borrow_mut().define(var.to_string(), Value::Integer(i));
        result = evaluate(body, local.clone())?;
    }
    Ok(result)
}

fn expect_integer(value: Value, span: Span) -> EvalResult<i64> {
    match value {
        Value::Integer(n) => Ok(n),
        other => Err(EvalError::TypeMismatch {
            name: "for".to_string(),
            expected: "integer bounds".to_string(),
            found: other.type_name(),
            span,
        }),
    }
}

// (lambda (params...) body)
fn evaluate_lambda(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    let [params, body] = operands else {
        return Err(EvalError::MalformedForm(
            format!(
                "lambda expects a parameter list and a body, got {} operand(s)",
                operands.len()
            ),
            span,
        ));
    };
    let Expr::List(param_nodes) = &params.kind else {
        return Err(EvalError::MalformedForm(
            format!("lambda parameters must be a list, got {}", params),
            params.span,
        ));
    };

    let mut names: Vec<String> = Vec::with_capacity(param_nodes.len());
    for param in param_nodes {
        match param.kind.as_symbol() {
            Some(name) if names.iter().any(|n| n == name) => {
                return Err(EvalError::MalformedForm(
                    format!("duplicate lambda parameter '{}'", name),
                    param.span,
                ));
            }
            Some(name) => names.push(name.to_string()),
            None => {
                return Err(EvalError::MalformedForm(
                    format!("lambda parameter must be a symbol, got {}", param),
                    param.span,
                ));
            }
        }
    }

    Ok(Value::Procedure(Procedure::Lambda(Rc::new(Lambda {
        params: names,
        body: body.clone(),
        env,
    }))))
}

// (and a b) / (or a b): the second operand only runs when it decides the result.
fn evaluate_and_or(
    operands: &[Node],
    env: Rc<RefCell<Environment>>,
    span: Span,
    is_and: bool,
) -> EvalResult {
    let keyword = if is_and { "and" } else { "or" };
    let [left, right] = operands else {
        return Err(EvalError::MalformedForm(
            format!("{} expects 2 operands, got {}", keyword, operands.len()),
            span,
        ));
    };
    let left = evaluate(left, env.clone())?;
    if left.is_truthy() == is_and {
        evaluate(right, env)
    } else {
        Ok(left)
    }
}
