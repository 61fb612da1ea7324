use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;

use crate::error::Result;
use crate::resolver::{
    AsyncResolver, Bindings, ResolverResult, SyncResolver, async_resolver, sync_resolver,
};
use crate::scanner::MacroPattern;
use crate::value::Value;

/// The sync and async resolvers registered for one macro name. Either may be
/// missing; synchronous expansion can only use `sync`.
#[derive(Clone, Default)]
pub struct Replacement {
    pub sync: Option<SyncResolver>,
    pub r#async: Option<AsyncResolver>,
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replacement")
            .field("sync", &self.sync.is_some())
            .field("async", &self.r#async.is_some())
            .finish()
    }
}

/// Supplies named macro resolvers to the expander.
pub trait VariableSource: Send + Sync {
    fn get(&self, name: &str) -> Option<Replacement>;

    /// Every name this source can resolve.
    fn names(&self) -> Vec<String>;

    /// Names this source allows at all. `None` allows everything.
    fn allowlist(&self) -> Option<&HashSet<String>> {
        None
    }

    /// Pattern matching the union of this source's names and the one-off
    /// binding names, restricted by both allowlists.
    fn pattern(
        &self,
        bindings: Option<&Bindings>,
        allowlist: Option<&HashSet<String>>,
    ) -> Result<MacroPattern> {
        let mut names = self.names();
        if let Some(bindings) = bindings {
            names.extend(bindings.names().map(str::to_string));
        }
        MacroPattern::build(names, self.allowlist(), allowlist)
    }
}

/// In-memory variable source.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    replacements: HashMap<String, Replacement>,
    allowlist: Option<HashSet<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the names this registry will ever expose to the expander.
    pub fn with_allowlist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Register a synchronous resolver. Keeps any async resolver already set.
    pub fn set<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&[String]) -> ResolverResult + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!("Registering sync resolver: {}", name);
        self.replacements.entry(name).or_default().sync = Some(sync_resolver(f));
        self
    }

    /// Register an asynchronous resolver. Keeps any sync resolver already set.
    pub fn set_async<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!("Registering async resolver: {}", name);
        self.replacements.entry(name).or_default().r#async = Some(async_resolver(f));
        self
    }

    pub fn set_both<F, G, Fut>(&mut self, name: impl Into<String>, sync: F, r#async: G) -> &mut Self
    where
        F: Fn(&[String]) -> ResolverResult + Send + Sync + 'static,
        G: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        let name = name.into();
        self.set(name.clone(), sync).set_async(name, r#async)
    }

    /// Register a constant.
    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.set(name, move |_| Ok(value.clone()))
    }

    pub fn remove(&mut self, name: &str) -> Option<Replacement> {
        self.replacements.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.replacements.contains_key(name)
    }
}

impl VariableSource for Registry {
    fn get(&self, name: &str) -> Option<Replacement> {
        self.replacements.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.replacements.keys().cloned().collect()
    }

    fn allowlist(&self) -> Option<&HashSet<String>> {
        self.allowlist.as_ref()
    }
}

impl<T: VariableSource + ?Sized> VariableSource for &T {
    fn get(&self, name: &str) -> Option<Replacement> {
        (**self).get(name)
    }

    fn names(&self) -> Vec<String> {
        (**self).names()
    }

    fn allowlist(&self) -> Option<&HashSet<String>> {
        (**self).allowlist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_set_async_share_an_entry() {
        let mut registry = Registry::new();
        registry
            .set("FOO", |_| Ok("sync".into()))
            .set_async("FOO", |_| async { Ok("async".into()) });

        let replacement = registry.get("FOO").unwrap();
        assert!(replacement.sync.is_some());
        assert!(replacement.r#async.is_some());
        assert!(registry.get("BAR").is_none());
    }

    #[test]
    fn test_pattern_includes_bindings() {
        let mut registry = Registry::new();
        registry.set_value("FOO", "1");
        let bindings = Bindings::new().with_value("BAR", "2");

        let pattern = registry.pattern(Some(&bindings), None).unwrap();
        assert_eq!(pattern.macro_names("FOO BAR BAZ"), vec!["FOO", "BAR"]);
    }

    #[test]
    fn test_source_allowlist_applies_to_bindings() {
        let mut registry = Registry::new().with_allowlist(["FOO"]);
        registry.set_value("FOO", "1");
        let bindings = Bindings::new().with_value("BAR", "2");

        let pattern = registry.pattern(Some(&bindings), None).unwrap();
        assert_eq!(pattern.macro_names("FOO BAR"), vec!["FOO"]);
    }
}
