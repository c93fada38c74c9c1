use std::borrow::Cow;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use lispy::evaluator::special_form_identifiers;
use lispy::{
    Environment, Error, TokenKind, Value, create_global_environment, run_in, tokenize,
};
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, EditMode, Editor, EventHandler, KeyCode, KeyEvent};
use rustyline::{Helper, Highlighter, Hinter, Modifiers, Validator};
use tracing::{debug, warn};

const PROMPT: &str = "lispy> ";

struct LispyCompleter {
    env: Rc<RefCell<Environment>>,
}

impl rustyline::completion::Completer for LispyCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let prefix = match tokenize(&line[..pos]) {
            Ok(tokens) => match tokens.last() {
                Some(token) if token.kind == TokenKind::Symbol && token.span.end == pos => {
                    token.text.clone()
                }
                _ => return Ok((pos, vec![])),
            },
            Err(_) => return Ok((pos, vec![])),
        };

        let mut candidates: Vec<String> = self
            .env
            .borrow()
            .get_identifiers()
            .union(&special_form_identifiers())
            .filter(|id| id.starts_with(&prefix))
            .cloned()
            .collect();
        candidates.sort();
        Ok((pos - prefix.len(), candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct InputHelper {
    #[rustyline(Validator)]
    validator: LispyValidator,
    #[rustyline(Highlighter)]
    highlighter: LispyHighlighter,
    #[rustyline(Completer)]
    completer: LispyCompleter,
}

#[derive(Debug, PartialEq)]
enum Balance {
    Complete,
    Incomplete,
    Unmatched(usize),
}

/// Scans `input` for open strings and parentheses. Positions are byte offsets.
fn balance(input: &str) -> Balance {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in input.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Balance::Unmatched(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    if in_string || depth > 0 {
        Balance::Incomplete
    } else {
        Balance::Complete
    }
}

struct LispyValidator;

impl Validator for LispyValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        Ok(match balance(ctx.input()) {
            Balance::Complete => ValidationResult::Valid(None),
            Balance::Incomplete => ValidationResult::Incomplete,
            Balance::Unmatched(i) => ValidationResult::Invalid(Some(format!(
                "  - Unmatched ')' at position {}",
                i
            ))),
        })
    }
}

struct LispyHighlighter;

impl Highlighter for LispyHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let cursor = pos.checked_sub(1);
        // (offset in `line`, offset in `highlighted`) of each open paren
        let mut stack: Vec<(usize, usize)> = Vec::new();
        let mut highlighted = String::new();
        let mut in_string = false;
        let mut escape = false;

        for (i, c) in line.char_indices() {
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c)); // green
                continue;
            }

            match c {
                '"' => {
                    in_string = true;
                    highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c));
                }
                '(' => {
                    stack.push((i, highlighted.len()));
                    highlighted.push(c);
                }
                ')' => match stack.pop() {
                    Some((open_at, open_index)) => {
                        if cursor == Some(i) || cursor == Some(open_at) {
                            highlighted.push_str("\x1b[34m)\x1b[0m"); // blue
                            highlighted
                                .replace_range(open_index..=open_index, "\x1b[1;34m(\x1b[0m");
                        } else {
                            highlighted.push(c);
                        }
                    }
                    None => highlighted.push_str("\x1b[31m)\x1b[0m"), // red
                },
                _ => highlighted.push(c),
            }
        }

        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

/// Renders the results of one input the way the CLI prints them: a single
/// value as itself, several as a list.
pub fn format_results(values: Vec<Value>) -> Option<String> {
    match values.len() {
        0 => None,
        1 => values.into_iter().next().map(|value| value.to_string()),
        _ => Some(Value::List(values).to_string()),
    }
}

/// Prints `error` against `input`, falling back to its plain message if the
/// report cannot be written.
pub fn report_error(error: &Error, name: &str, input: &str) {
    if let Err(io_err) = error.pretty_print(name, input) {
        warn!(%io_err, "failed to render error report");
        eprintln!("Error: {}", error);
    }
}

fn eval_line(line: &str, env: &Rc<RefCell<Environment>>) {
    match run_in(line, env.clone()) {
        Ok(values) => {
            if let Some(output) = format_results(values) {
                println!("{}", output);
            }
        }
        Err(error) => {
            // Expressions before the failing one already ran; show their values
            if let Error::Eval { completed, .. } = &error {
                if let Some(output) = format_results(completed.clone()) {
                    println!("{}", output);
                }
            }
            report_error(&error, "REPL", line);
        }
    }
}

/// Runs the interactive loop until `exit`, `quit` or Ctrl-D.
pub fn run_repl(history: &Path, vi_mode: bool) -> rustyline::Result<()> {
    println!("Lispy REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let global_env = create_global_environment();
    let helper = InputHelper {
        validator: LispyValidator,
        highlighter: LispyHighlighter,
        completer: LispyCompleter {
            env: global_env.clone(),
        },
    };
    let edit_mode = if vi_mode { EditMode::Vi } else { EditMode::Emacs };
    let config = Config::builder().edit_mode(edit_mode).build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(helper));
    // Ctrl-S submits even when the validator still wants more input
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if rl.load_history(history).is_err() {
        debug!(path = %history.display(), "no previous history");
    }

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(input)?;
                if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                    break;
                }
                eval_line(input, &global_env);
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history(history)
}
