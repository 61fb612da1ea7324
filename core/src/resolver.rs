use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::ResolverError;
use crate::value::Value;

pub type ResolverResult = std::result::Result<Value, ResolverError>;

/// Synchronous resolver. Receives one string per positional argument.
pub type SyncResolver = Arc<dyn Fn(&[String]) -> ResolverResult + Send + Sync>;

/// Asynchronous resolver. Receives one string per positional argument.
pub type AsyncResolver = Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, ResolverResult> + Send + Sync>;

pub fn sync_resolver<F>(f: F) -> SyncResolver
where
    F: Fn(&[String]) -> ResolverResult + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn async_resolver<F, Fut>(f: F) -> AsyncResolver
where
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResolverResult> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// Positional argument `index`, or `""` when the caller left it out.
pub fn arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or("")
}

/// What a one-off binding resolves with.
#[derive(Clone)]
pub enum Resolver {
    Value(Value),
    Sync(SyncResolver),
    Async(AsyncResolver),
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Resolver::Sync(_) => write!(f, "Sync(<fn>)"),
            Resolver::Async(_) => write!(f, "Async(<fn>)"),
        }
    }
}

/// Caller supplied bindings for a single expansion. They take precedence over
/// the variable source and may introduce names the source does not know.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: HashMap<String, Resolver>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, resolver: Resolver) -> &mut Self {
        self.entries.insert(name.into(), resolver);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Resolver> {
        self.entries.remove(name)
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, Resolver::Value(value.into()));
        self
    }

    pub fn with_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[String]) -> ResolverResult + Send + Sync + 'static,
    {
        self.insert(name, Resolver::Sync(sync_resolver(f)));
        self
    }

    pub fn with_async_fn<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        self.insert(name, Resolver::Async(async_resolver(f)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Resolver> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
