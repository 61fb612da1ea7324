use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::value::Value;

/// Shared sink recording which macros fired and what they resolved to,
/// keyed as `NAME` or `NAME(arg1,arg2)`.
#[derive(Debug, Clone, Default)]
pub struct CollectedVars {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl CollectedVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolution. Empty arguments are left out of the key and falsy
    /// values are stored as the empty string.
    pub fn record(&self, name: &str, args: Option<&[String]>, value: &Value) {
        let key = match args {
            Some(args) => {
                let rendered = args
                    .iter()
                    .filter(|arg| !arg.is_empty())
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}({})", name, rendered)
            }
            None => name.to_string(),
        };
        let value = if value.is_truthy() {
            value.coerce().unwrap_or_default()
        } else {
            String::new()
        };

        tracing::debug!("Collected {} = {:?}", key, value);
        self.lock().insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // A panicking resolver must not make the sink unusable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
