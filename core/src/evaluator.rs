use futures::FutureExt;
use futures::future::{self, BoxFuture};

use crate::binding::{Binding, Mode};
use crate::collect::CollectedVars;
use crate::lexer::{Lexeme, Lexer, Token};
use crate::materialize::{concat_pending, concat_ready, materialize_async, materialize_sync};
use crate::resolver::Bindings;
use crate::scanner::Match;
use crate::source::VariableSource;

/// Deepest `NAME(` nesting evaluated as calls. Past it, `(` is plain text.
pub const MAX_NESTING: usize = 256;

/// A piece of the output: either final text or text that is still being
/// resolved.
pub enum Fragment {
    Text(String),
    Pending(BoxFuture<'static, String>),
}

impl Fragment {
    pub fn into_future(self) -> BoxFuture<'static, String> {
        match self {
            Fragment::Text(text) => future::ready(text).boxed(),
            Fragment::Pending(pending) => pending,
        }
    }

    fn is_text(&self) -> bool {
        matches!(self, Fragment::Text(_))
    }
}

/// What the evaluator reads from the expander for one expansion.
pub struct EvalContext<'e> {
    pub source: &'e dyn VariableSource,
    pub bindings: Option<&'e Bindings>,
    pub collector: Option<&'e CollectedVars>,
    pub mode: Mode,
}

/// State of one walk over a template. Nested argument lists are evaluated by
/// recursive calls that share the cursor, the match index, the pending-call
/// stack and the escape flag.
pub struct Evaluator<'e> {
    input: &'e str,
    lexemes: Vec<Lexeme>,
    position: usize,
    matches: &'e [Match],
    match_index: usize,
    stack: Vec<Binding>,
    pending_calls: usize,
    ignoring: bool,
    context: &'e EvalContext<'e>,
}

impl<'e> Evaluator<'e> {
    pub fn new(input: &'e str, matches: &'e [Match], context: &'e EvalContext<'e>) -> Self {
        Self {
            input,
            lexemes: Lexer::new(input).collect_lexemes(),
            position: 0,
            matches,
            match_index: 0,
            stack: Vec::new(),
            pending_calls: 0,
            ignoring: false,
            context,
        }
    }

    /// Evaluate the whole template. `encode` applies to top level macros only.
    pub fn run(mut self, encode: bool) -> Fragment {
        let span = tracing::debug_span!("evaluate", matches = self.matches.len());
        let _enter = span.enter();

        self.evaluate_level(encode)
    }

    /// Current byte offset of the cursor.
    pub fn offset(&self) -> usize {
        self.lexemes
            .get(self.position)
            .map(|lexeme| lexeme.span.start)
            .unwrap_or(self.input.len())
    }

    fn token_at(&self, position: usize) -> Option<Token> {
        self.lexemes.get(position).map(|lexeme| lexeme.token)
    }

    fn at_next_match(&self) -> bool {
        self.matches
            .get(self.match_index)
            .is_some_and(|m| m.start == self.offset())
    }

    /// Move the cursor to the first character at or after byte offset `stop`.
    fn seek(&mut self, stop: usize) {
        while self.position < self.lexemes.len() && self.lexemes[self.position].span.start < stop {
            self.position += 1;
        }
    }

    fn evaluate_level(&mut self, encode: bool) -> Fragment {
        let mut builder = String::new();
        let mut results: Vec<Fragment> = Vec::new();
        let mut args: Vec<Vec<Fragment>> = Vec::new();

        while let Some(lexeme) = self.lexemes.get(self.position).cloned() {
            if self.at_next_match() {
                if !self.ignoring {
                    self.begin_macro(encode, &mut builder, &mut results);
                    continue;
                }
                // Escaped names are plain text.
                self.match_index += 1;
            }

            match lexeme.token {
                Token::Backtick => {
                    if !self.ignoring {
                        self.ignoring = true;
                        // Text before the backtick, e.g. FOO(a`b`)
                        push_trimmed(&builder, &mut results);
                    } else {
                        self.ignoring = false;
                        // Escaped text keeps its whitespace.
                        if !builder.is_empty() {
                            results.push(Fragment::Text(builder.clone()));
                        }
                    }
                    builder.clear();
                    self.position += 1;
                }
                Token::Comma if self.pending_calls > 0 && !self.ignoring => {
                    push_trimmed(&builder, &mut results);
                    args.push(std::mem::take(&mut results));

                    // `FOO(a,,b)` passes an explicit empty second argument.
                    if self.token_at(self.position + 1) == Some(Token::Comma) {
                        args.push(vec![Fragment::Text(String::new())]);
                        self.position += 1;
                    }

                    builder.clear();
                    self.position += 1;
                }
                Token::RParen if self.pending_calls > 0 && !self.ignoring => {
                    self.position += 1;
                    self.pending_calls -= 1;

                    push_trimmed(&builder, &mut results);
                    args.push(results);

                    return match self.stack.pop() {
                        Some(binding) => self.materialize(binding, Some(args)),
                        None => Fragment::Text(String::new()),
                    };
                }
                _ => {
                    builder.push_str(&self.input[lexeme.span.clone()]);
                    self.position += 1;
                }
            }
        }

        // Trailing characters.
        if !builder.is_empty() {
            results.push(Fragment::Text(builder));
        }

        self.join(results)
    }

    /// The cursor is on an unescaped macro name.
    fn begin_macro(&mut self, encode: bool, builder: &mut String, results: &mut Vec<Fragment>) {
        let next = &self.matches[self.match_index];
        let (name, stop) = (next.name.clone(), next.stop);

        // Arguments of a pending call may be spread over several lines.
        if !builder.trim().is_empty() {
            let literal = if self.pending_calls > 0 {
                builder.trim_start()
            } else {
                builder.as_str()
            };
            results.push(Fragment::Text(literal.to_string()));
        }
        builder.clear();

        let binding = Binding::resolve(
            &name,
            encode,
            self.context.bindings,
            self.context.source,
            self.context.mode,
        );

        self.seek(stop);
        self.match_index += 1;

        let opens_call = self.token_at(self.position) == Some(Token::LParen);
        if opens_call && self.pending_calls < MAX_NESTING {
            self.position += 1;
            self.pending_calls += 1;
            self.stack.push(binding);
            let value = self.evaluate_level(false);
            results.push(value);
        } else {
            if opens_call {
                tracing::warn!(
                    target: "Expander",
                    "macro nesting exceeds {} levels, arguments of {} are kept as text",
                    MAX_NESTING,
                    name
                );
            }
            results.push(self.materialize(binding, None));
        }
    }

    fn materialize(&self, binding: Binding, args: Option<Vec<Vec<Fragment>>>) -> Fragment {
        match self.context.mode {
            Mode::Sync => Fragment::Text(materialize_sync(binding, args, self.context.collector)),
            Mode::Async => Fragment::Pending(materialize_async(
                binding,
                args,
                self.context.collector.cloned(),
            )),
        }
    }

    fn join(&self, results: Vec<Fragment>) -> Fragment {
        if self.context.mode == Mode::Sync || results.iter().all(Fragment::is_text) {
            Fragment::Text(concat_ready(results))
        } else {
            Fragment::Pending(concat_pending(results))
        }
    }
}

fn push_trimmed(builder: &str, results: &mut Vec<Fragment>) {
    let trimmed = builder.trim();
    if !trimmed.is_empty() {
        results.push(Fragment::Text(trimmed.to_string()));
    }
}
