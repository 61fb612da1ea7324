use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::binding::Mode;
use crate::collect::CollectedVars;
use crate::evaluator::{EvalContext, Evaluator, Fragment};
use crate::resolver::Bindings;
use crate::scanner::{MacroPattern, Match};
use crate::source::VariableSource;

/// Result of [`Expander::expand`]. Synchronous expanders always return
/// `Ready`; asynchronous ones return `Pending` once any macro is involved.
/// Either way it can be awaited.
pub enum Expansion {
    Ready(Option<String>),
    Pending(BoxFuture<'static, String>),
}

impl Expansion {
    pub fn ready(value: impl Into<String>) -> Self {
        Expansion::Ready(Some(value.into()))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Expansion::Ready(_))
    }

    /// The expanded string if no work is outstanding.
    pub fn into_ready(self) -> Option<String> {
        match self {
            Expansion::Ready(value) => value,
            Expansion::Pending(_) => None,
        }
    }
}

impl fmt::Debug for Expansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expansion::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Expansion::Pending(_) => write!(f, "Pending"),
        }
    }
}

impl Future for Expansion {
    type Output = String;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<String> {
        match self.get_mut() {
            Expansion::Ready(value) => Poll::Ready(value.take().unwrap_or_default()),
            Expansion::Pending(pending) => pending.poll_unpin(cx),
        }
    }
}

/// Expands macro invocations in URL templates, e.g.
/// `?cid=CLIENT_ID(__ga)&tgt=FOO(BAR(1),2)`.
///
/// Configured once, then used for any number of [`expand`](Self::expand)
/// calls; no state is shared between calls other than the collector.
pub struct Expander<'s> {
    source: &'s dyn VariableSource,
    bindings: Option<Bindings>,
    collector: Option<CollectedVars>,
    mode: Mode,
    allowlist: Option<HashSet<String>>,
    encode: bool,
}

impl<'s> Expander<'s> {
    pub fn new(source: &'s dyn VariableSource) -> Self {
        Self {
            source,
            bindings: None,
            collector: None,
            mode: Mode::Async,
            allowlist: None,
            encode: true,
        }
    }

    /// One-off bindings; they win over the variable source.
    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    /// Record every resolution into `collector`.
    pub fn collect_into(mut self, collector: CollectedVars) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Resolve without suspending. Macros that only have an async resolver
    /// expand to the empty string.
    pub fn synchronous(mut self, sync: bool) -> Self {
        self.mode = if sync { Mode::Sync } else { Mode::Async };
        self
    }

    /// Only substitute the given names.
    pub fn with_allowlist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_allowlist_set(mut self, allowlist: Option<HashSet<String>>) -> Self {
        self.allowlist = allowlist;
        self
    }

    /// Do not percent-encode top level results.
    pub fn without_encoding(mut self) -> Self {
        self.encode = false;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn expand(&self, input: &str) -> Expansion {
        let span = tracing::debug_span!("expand", mode = ?self.mode, encode = self.encode);
        let _enter = span.enter();

        if input.is_empty() {
            return Expansion::ready(input);
        }

        let matches = self.find_matches(input);
        if matches.is_empty() {
            tracing::debug!("No macros in input");
            return Expansion::ready(input);
        }

        let context = EvalContext {
            source: self.source,
            bindings: self.bindings.as_ref(),
            collector: self.collector.as_ref(),
            mode: self.mode,
        };

        match Evaluator::new(input, &matches, &context).run(self.encode) {
            Fragment::Text(text) => Expansion::ready(text),
            Fragment::Pending(pending) => Expansion::Pending(pending),
        }
    }

    /// Expand and return the text. Pending work is dropped, so this is only
    /// meaningful on a synchronous expander.
    pub fn expand_sync(&self, input: &str) -> String {
        self.expand(input).into_ready().unwrap_or_default()
    }

    pub async fn expand_async(&self, input: &str) -> String {
        self.expand(input).await
    }

    /// Names of the recognised macros in `input`, in order of appearance.
    pub fn macro_names(&self, input: &str) -> Vec<String> {
        self.pattern().macro_names(input)
    }

    fn find_matches(&self, input: &str) -> Vec<Match> {
        self.pattern().find_matches(input)
    }

    fn pattern(&self) -> MacroPattern {
        self.source
            .pattern(self.bindings.as_ref(), self.allowlist.as_ref())
            .unwrap_or_else(|e| {
                tracing::error!(target: "Expander", "{}", e);
                MacroPattern::nothing()
            })
    }
}
