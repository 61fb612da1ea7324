use std::collections::{BTreeMap, HashSet};

use url::Url;

use crate::collect::CollectedVars;
use crate::error::{MacroError, Result};
use crate::expander::Expander;
use crate::resolver::Bindings;
use crate::source::VariableSource;

const UNSAFE_SCHEMES: [&str; 3] = ["javascript", "data", "vbscript"];

/// Per-call options for [`UrlReplacements`].
#[derive(Debug, Clone, Default)]
pub struct ExpandParams {
    pub bindings: Option<Bindings>,
    pub collector: Option<CollectedVars>,
    pub allowlist: Option<HashSet<String>>,
}

impl ExpandParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    pub fn collector(mut self, collector: CollectedVars) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn allowlist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Caller facing entry points over a variable source: plain string
/// expansion, URL expansion with a protocol check, and variable discovery.
pub struct UrlReplacements<S: VariableSource> {
    source: S,
}

impl<S: VariableSource> UrlReplacements<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn expander(&self, params: ExpandParams, sync: bool, encode: bool) -> Expander<'_> {
        let mut expander = Expander::new(&self.source)
            .synchronous(sync)
            .with_allowlist_set(params.allowlist);
        if let Some(bindings) = params.bindings {
            expander = expander.with_bindings(bindings);
        }
        if let Some(collector) = params.collector {
            expander = expander.collect_into(collector);
        }
        if !encode {
            expander = expander.without_encoding();
        }
        expander
    }

    /// Expand without suspending and without encoding. Async-only macros
    /// become empty strings.
    pub fn expand_string_sync(&self, input: &str, params: ExpandParams) -> String {
        // Synchronous expansions are always ready.
        self.expander(params, true, false)
            .expand(input)
            .into_ready()
            .unwrap_or_default()
    }

    pub async fn expand_string_async(&self, input: &str, params: ExpandParams) -> String {
        self.expander(params, false, false).expand(input).await
    }

    /// Expand a URL synchronously, encoding substituted values.
    pub fn expand_url_sync(&self, url: &str, params: ExpandParams) -> Result<String> {
        let replacement = self
            .expander(params, true, true)
            .expand(url)
            .into_ready()
            .unwrap_or_default();
        ensure_protocol_matches(url, replacement)
    }

    pub async fn expand_url_async(&self, url: &str, params: ExpandParams) -> Result<String> {
        let replacement = self.expander(params, false, true).expand(url).await;
        ensure_protocol_matches(url, replacement)
    }

    /// Expand `url` and return what every macro resolved to.
    pub async fn collect_vars(
        &self,
        url: &str,
        bindings: Option<Bindings>,
    ) -> BTreeMap<String, String> {
        let collector = CollectedVars::new();
        let mut params = ExpandParams::new().collector(collector.clone());
        params.bindings = bindings;

        self.expander(params, false, true).expand(url).await;
        collector.snapshot()
    }

    /// Macros in `url` that `allowlist` does not permit; all of them when
    /// there is no allowlist.
    pub fn collect_disallowed_vars(
        &self,
        url: &str,
        allowlist: Option<&HashSet<String>>,
    ) -> Vec<String> {
        let names = Expander::new(&self.source).macro_names(url);
        match allowlist {
            Some(allowed) => names
                .into_iter()
                .filter(|name| !allowed.contains(name))
                .collect(),
            None => names,
        }
    }
}

/// Relative templates are resolved against this, as a page URL would be.
const BASE_URL: &str = "https://localhost/";

/// Scheme `url` would have once loaded. Falls back to a leading `scheme:`
/// prefix when the text is not a valid URL yet, e.g. a macro in the port.
fn scheme_of(url: &str) -> String {
    match Url::parse(BASE_URL).and_then(|base| base.join(url)) {
        Ok(parsed) => parsed.scheme().to_string(),
        Err(_) => leading_scheme(url)
            .unwrap_or("https")
            .to_ascii_lowercase(),
    }
}

fn leading_scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.trim_start().split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next()?.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

/// Keep the original URL if expansion changed its protocol, and refuse
/// script-capable protocols outright.
pub fn ensure_protocol_matches(url: &str, replacement: String) -> Result<String> {
    let old = scheme_of(url);
    let new = scheme_of(&replacement);
    if old != new {
        tracing::error!(target: "UrlReplacements", "Illegal replacement of the protocol: {}", url);
        return Ok(url.to_string());
    }

    if UNSAFE_SCHEMES.contains(&new.as_str()) {
        return Err(MacroError::InvalidProtocol(replacement));
    }
    Ok(replacement)
}
