use std::collections::{BTreeSet, HashSet};

use regex::Regex;

use crate::error::Result;

/// Span of one macro name inside a template. Offsets are byte offsets,
/// `stop` is exclusive and includes an optional leading `$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub name: String,
    pub start: usize,
    pub stop: usize,
    pub length: usize,
}

/// Compiled pattern recognising every eligible macro name.
#[derive(Debug, Clone)]
pub struct MacroPattern {
    regex: Option<Regex>,
}

impl MacroPattern {
    /// Build `\$?(NAME|...)` from `names`, longest names first so that
    /// `RANDOM_ONE` is never read as `RANDOM` followed by `_ONE`.
    ///
    /// `source_allowlist` is the allowlist carried by the variable source and
    /// `call_allowlist` the one passed for a single expansion; a name must pass
    /// both. An empty result matches nothing.
    pub fn build<I, S>(
        names: I,
        source_allowlist: Option<&HashSet<String>>,
        call_allowlist: Option<&HashSet<String>>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.is_empty())
            .filter(|name| source_allowlist.is_none_or(|allowed| allowed.contains(name)))
            .filter(|name| call_allowlist.is_none_or(|allowed| allowed.contains(name)))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if keys.is_empty() {
            return Ok(Self::nothing());
        }

        keys.sort_by(|a, b| b.len().cmp(&a.len()));
        let alternatives = keys
            .iter()
            .map(|key| regex::escape(key))
            .collect::<Vec<_>>()
            .join("|");

        let regex = Regex::new(&format!(r"\$?({})", alternatives))?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn nothing() -> Self {
        Self { regex: None }
    }

    pub fn matches_nothing(&self) -> bool {
        self.regex.is_none()
    }

    /// Every occurrence in `input`, in order, duplicates included.
    pub fn find_matches(&self, input: &str) -> Vec<Match> {
        let Some(regex) = &self.regex else {
            return Vec::new();
        };

        regex
            .captures_iter(input)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?;
                Some(Match {
                    name: name.as_str().to_string(),
                    start: whole.start(),
                    stop: whole.end(),
                    length: whole.len(),
                })
            })
            .collect()
    }

    /// Text of every macro occurrence in `input`, without evaluating them.
    /// A leading `$` is kept, so `$FOO` is reported as `$FOO`.
    pub fn macro_names(&self, input: &str) -> Vec<String> {
        let Some(regex) = &self.regex else {
            return Vec::new();
        };
        regex
            .find_iter(input)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}
