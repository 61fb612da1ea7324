use futures::FutureExt;
use futures::future::{self, BoxFuture};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::binding::{Binding, BindingSource};
use crate::collect::CollectedVars;
use crate::evaluator::Fragment;
use crate::resolver::{Resolver, ResolverResult};
use crate::value::Value;

/// Everything `encodeURIComponent` escapes.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

/// Join already-resolved fragments. Only synchronous expansion calls this,
/// and it never produces pending fragments.
pub(crate) fn concat_ready(fragments: Vec<Fragment>) -> String {
    fragments
        .into_iter()
        .map(|fragment| match fragment {
            Fragment::Text(text) => text,
            Fragment::Pending(_) => {
                tracing::error!(target: "Expander", "pending fragment in synchronous expansion");
                String::new()
            }
        })
        .collect()
}

/// Await every fragment and join them in their original order.
pub(crate) fn concat_pending(fragments: Vec<Fragment>) -> BoxFuture<'static, String> {
    future::join_all(fragments.into_iter().map(Fragment::into_future))
        .map(|parts| parts.concat())
        .boxed()
}

pub(crate) fn materialize_sync(
    binding: Binding,
    args: Option<Vec<Vec<Fragment>>>,
    collector: Option<&CollectedVars>,
) -> String {
    let args: Option<Vec<String>> =
        args.map(|groups| groups.into_iter().map(concat_ready).collect());
    let call_args = args.as_deref().unwrap_or(&[]);

    let outcome = match &binding.source {
        BindingSource::OneOff(Resolver::Value(value)) => Ok(value.clone()),
        BindingSource::OneOff(Resolver::Sync(f)) | BindingSource::Sync(f) => f(call_args),
        BindingSource::OneOff(Resolver::Async(_)) | BindingSource::Async(_) => {
            // The discarded value is not collected.
            tracing::error!(target: "Expander", "ignoring async macro resolution: {}", binding.name);
            return String::new();
        }
        BindingSource::Unresolved => Ok(Value::from("")),
    };

    let result = settle(&binding.name, args.as_deref(), outcome, collector);
    finish(binding.encode, result)
}

pub(crate) fn materialize_async(
    binding: Binding,
    args: Option<Vec<Vec<Fragment>>>,
    collector: Option<CollectedVars>,
) -> BoxFuture<'static, String> {
    async move {
        // Sibling arguments resolve concurrently; each one is joined only
        // after all of its own fragments settle.
        let args = match args {
            Some(groups) => Some(future::join_all(groups.into_iter().map(concat_pending)).await),
            None => None,
        };
        let call_args = args.clone().unwrap_or_default();

        let outcome = match binding.source {
            BindingSource::OneOff(Resolver::Value(value)) => Ok(value),
            BindingSource::OneOff(Resolver::Sync(f)) | BindingSource::Sync(f) => f(call_args.as_slice()),
            BindingSource::OneOff(Resolver::Async(f)) | BindingSource::Async(f) => {
                f(call_args).await
            }
            BindingSource::Unresolved => Ok(Value::Null),
        };

        let result = settle(&binding.name, args.as_deref(), outcome, collector.as_ref());
        finish(binding.encode, result)
    }
    .boxed()
}

/// Turn a resolver outcome into the substituted text, recording it if asked.
fn settle(
    name: &str,
    args: Option<&[String]>,
    outcome: ResolverResult,
    collector: Option<&CollectedVars>,
) -> String {
    let value = match outcome {
        Ok(value) => value,
        Err(e) => {
            // Report, but do not disrupt the rest of the template.
            tracing::error!(target: "Expander", "resolver for {} failed: {}", name, e);
            Value::from("")
        }
    };

    let (recorded, text) = match value.coerce() {
        Some(text) => (value, text),
        None => {
            tracing::error!(
                target: "Expander",
                "ignoring {} result of {}: {}",
                value.type_name(),
                name,
                value
            );
            (Value::from(""), String::new())
        }
    };

    if let Some(collector) = collector {
        collector.record(name, args, &recorded);
    }
    text
}

fn finish(encode: bool, result: String) -> String {
    if encode {
        encode_uri_component(&result)
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolverError;
    use crate::resolver::sync_resolver;

    fn binding(source: BindingSource, encode: bool) -> Binding {
        Binding {
            name: "FOO".to_string(),
            encode,
            source,
        }
    }

    fn text_args(args: &[&str]) -> Option<Vec<Vec<Fragment>>> {
        Some(
            args.iter()
                .map(|a| vec![Fragment::Text(a.to_string())])
                .collect(),
        )
    }

    #[test]
    fn test_encode_uri_component_keeps_marks() {
        assert_eq!(encode_uri_component("a b"), "a%20b");
        assert_eq!(encode_uri_component("hi!-2"), "hi!-2");
        assert_eq!(encode_uri_component("a&b=c/d"), "a%26b%3Dc%2Fd");
        assert_eq!(encode_uri_component("é"), "%C3%A9");
    }

    #[test]
    fn test_sync_join_groups_before_call() {
        let join = sync_resolver(|args| Ok(args.join("|").into()));
        let groups = Some(vec![
            vec![Fragment::Text("a".into()), Fragment::Text("b".into())],
            vec![Fragment::Text("c".into())],
        ]);

        let result = materialize_sync(binding(BindingSource::Sync(join), false), groups, None);
        assert_eq!(result, "ab|c");
    }

    #[test]
    fn test_sync_failures_become_empty_and_are_collected() {
        let vars = CollectedVars::new();
        let failing = sync_resolver(|_| Err(ResolverError::new("boom")));

        let result = materialize_sync(
            binding(BindingSource::Sync(failing), true),
            text_args(&["x"]),
            Some(&vars),
        );

        assert_eq!(result, "");
        assert_eq!(vars.get("FOO(x)"), Some(String::new()));
    }

    #[test]
    fn test_invalid_result_is_dropped() {
        let object = sync_resolver(|_| Ok(Value::Invalid("object".into())));
        let result = materialize_sync(binding(BindingSource::Sync(object), false), None, None);
        assert_eq!(result, "");
    }

    #[test]
    fn test_sync_refuses_one_off_async() {
        let vars = CollectedVars::new();
        let source = BindingSource::OneOff(Resolver::Async(crate::resolver::async_resolver(
            |_| async { Ok(Value::from("late")) },
        )));

        let result = materialize_sync(binding(source, false), None, Some(&vars));

        assert_eq!(result, "");
        assert!(vars.is_empty());
    }

    #[test]
    fn test_constant_is_encoded_once() {
        let source = BindingSource::OneOff(Resolver::Value(Value::from("a b")));
        assert_eq!(materialize_sync(binding(source.clone(), true), None, None), "a%20b");
        assert_eq!(materialize_sync(binding(source, false), None, None), "a b");
    }
}
