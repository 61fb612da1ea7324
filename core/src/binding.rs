use std::fmt;

use crate::resolver::{AsyncResolver, Bindings, Resolver, SyncResolver};
use crate::source::VariableSource;

/// Whether an expansion may suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Async,
}

/// Where the value of one macro occurrence comes from.
#[derive(Clone)]
pub enum BindingSource {
    OneOff(Resolver),
    Sync(SyncResolver),
    Async(AsyncResolver),
    Unresolved,
}

impl fmt::Debug for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingSource::OneOff(resolver) => f.debug_tuple("OneOff").field(resolver).finish(),
            BindingSource::Sync(_) => write!(f, "Sync(<fn>)"),
            BindingSource::Async(_) => write!(f, "Async(<fn>)"),
            BindingSource::Unresolved => write!(f, "Unresolved"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub encode: bool,
    pub source: BindingSource,
}

impl Binding {
    /// Pick the resolver for one occurrence of `name`.
    ///
    /// One-off bindings always win. Otherwise synchronous expansion can only
    /// use the source's sync resolver, and asynchronous expansion prefers the
    /// async resolver and falls back to the sync one.
    pub fn resolve(
        name: &str,
        encode: bool,
        bindings: Option<&Bindings>,
        source: &dyn VariableSource,
        mode: Mode,
    ) -> Self {
        let source = match bindings.and_then(|b| b.get(name)) {
            Some(resolver) => BindingSource::OneOff(resolver.clone()),
            None => {
                let replacement = source.get(name).unwrap_or_default();
                match mode {
                    Mode::Sync => match replacement.sync {
                        Some(sync) => BindingSource::Sync(sync),
                        None => {
                            tracing::error!(target: "Expander", "ignoring async replacement key: {}", name);
                            BindingSource::Unresolved
                        }
                    },
                    Mode::Async => match (replacement.r#async, replacement.sync) {
                        (Some(r#async), _) => BindingSource::Async(r#async),
                        (None, Some(sync)) => BindingSource::Sync(sync),
                        (None, None) => BindingSource::Unresolved,
                    },
                }
            }
        };

        tracing::debug!("Resolved binding {} -> {:?}", name, source);
        Self {
            name: name.to_string(),
            encode,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Registry;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .set("BOTH", |_| Ok("sync".into()))
            .set_async("BOTH", |_| async { Ok("async".into()) })
            .set("SYNC_ONLY", |_| Ok("sync".into()))
            .set_async("ASYNC_ONLY", |_| async { Ok("async".into()) });
        registry
    }

    #[test]
    fn test_one_off_binding_wins_in_both_modes() {
        let registry = registry();
        let bindings = Bindings::new().with_value("BOTH", "override");

        for mode in [Mode::Sync, Mode::Async] {
            let binding = Binding::resolve("BOTH", true, Some(&bindings), &registry, mode);
            assert!(matches!(binding.source, BindingSource::OneOff(Resolver::Value(_))));
            assert!(binding.encode);
        }
    }

    #[test]
    fn test_sync_mode_uses_sync_resolver() {
        let registry = registry();
        let binding = Binding::resolve("BOTH", false, None, &registry, Mode::Sync);
        assert!(matches!(binding.source, BindingSource::Sync(_)));
    }

    #[test]
    fn test_sync_mode_without_sync_resolver_is_unresolved() {
        let registry = registry();
        let binding = Binding::resolve("ASYNC_ONLY", false, None, &registry, Mode::Sync);
        assert!(matches!(binding.source, BindingSource::Unresolved));
    }

    #[test]
    fn test_async_mode_prefers_async_then_sync() {
        let registry = registry();
        let both = Binding::resolve("BOTH", false, None, &registry, Mode::Async);
        let sync_only = Binding::resolve("SYNC_ONLY", false, None, &registry, Mode::Async);
        let unknown = Binding::resolve("NOPE", false, None, &registry, Mode::Async);

        assert!(matches!(both.source, BindingSource::Async(_)));
        assert!(matches!(sync_only.source, BindingSource::Sync(_)));
        assert!(matches!(unknown.source, BindingSource::Unresolved));
    }
}
