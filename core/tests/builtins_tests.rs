use pretty_assertions::assert_eq;
use urlmacro_core::{Expander, Registry, builtins};

fn registry() -> Registry {
    let mut registry = Registry::new();
    builtins::register(&mut registry);
    registry
}

fn expand(input: &str) -> String {
    let registry = registry();
    Expander::new(&registry)
        .synchronous(true)
        .without_encoding()
        .expand_sync(input)
}

#[test]
fn test_string_macros() {
    assert_eq!(expand("$DEFAULT(,fallback)"), "fallback");
    assert_eq!(expand("$DEFAULT(value,fallback)"), "value");
    assert_eq!(expand("$SUBSTR(hello,1,3)"), "ell");
    assert_eq!(expand("$SUBSTR(hello,-2)"), "lo");
    assert_eq!(expand("$TRIM(`  padded  `)"), "padded");
    assert_eq!(expand("$TOLOWERCASE(MiXeD)"), "mixed");
    assert_eq!(expand("$TOUPPERCASE(MiXeD)"), "MIXED");
}

#[test]
fn test_conditionals() {
    assert_eq!(expand("$NOT()"), "true");
    assert_eq!(expand("$NOT(x)"), "false");
    assert_eq!(expand("$IF(true,yes,no)"), "yes");
    assert_eq!(expand("$IF(0,yes,no)"), "no");
    assert_eq!(expand("$IF(null,yes,no)"), "no");
    assert_eq!(expand("$EQUALS(a,a)"), "true");
    assert_eq!(expand("$EQUALS(a,b)"), "false");
}

#[test]
fn test_nested_builtins() {
    assert_eq!(
        expand("$TOUPPERCASE($DEFAULT(,$SUBSTR(abcdef,2,2)))"),
        "CD"
    );
}

#[test]
fn test_regex_macros() {
    assert_eq!(expand("$REPLACE(a-b-c,-,_)"), "a_b_c");
    assert_eq!(expand("$REPLACE(a-b-c,-)"), "abc");
    assert_eq!(expand("$REPLACE(ab,`(a)`,$1x)"), "axb");
    assert_eq!(expand("$MATCH(thisisatest,`thisisa(test)`,1)"), "test");
    assert_eq!(expand("$MATCH(thisisatest,nomatch)"), "");
}

#[test]
fn test_calc() {
    assert_eq!(expand("$CALC(1,2,add,false)"), "3");
    assert_eq!(expand("$CALC(5,2,subtract,false)"), "3");
    assert_eq!(expand("$CALC(1.5,2,multiply,false)"), "3");
    assert_eq!(expand("$CALC(10,4,divide,false)"), "2.5");
    assert_eq!(expand("$CALC(10,4,divide,true)"), "3");
    assert_eq!(expand("x=$CALC(1,0,divide,false)&y=1"), "x=&y=1");
}

#[test]
fn test_base64_uses_url_alphabet_and_dot_padding() {
    assert_eq!(expand("$BASE64(Hello World!)"), "SGVsbG8gV29ybGQh");
    assert_eq!(expand("$BASE64(ab)"), "YWI.");
}

#[tokio::test]
async fn test_hash_is_async_only() {
    let registry = registry();
    assert_eq!(
        Expander::new(&registry).synchronous(true).expand_sync("$HASH(test)"),
        ""
    );

    let hash = Expander::new(&registry).expand_async("$HASH(test)").await;
    assert_eq!(hash.len(), 64);
    assert!(!hash.contains(['+', '/', '=']));
}

#[test]
fn test_environment_macros() {
    let random: f64 = expand("RANDOM").parse().unwrap();
    assert!((0.0..1.0).contains(&random));

    let timestamp: i64 = expand("TIMESTAMP").parse().unwrap();
    assert!(timestamp > 1_500_000_000_000);

    let iso = expand("TIMESTAMP_ISO");
    assert!(iso.ends_with('Z'), "{}", iso);
    assert!(chrono::DateTime::parse_from_rfc3339(&iso).is_ok());

    let offset: i32 = expand("TIMEZONE").parse().unwrap();
    assert!(offset.abs() <= 14 * 60);
}

#[test]
fn test_counter_counts_per_scope() {
    let registry = registry();
    let expander = Expander::new(&registry).synchronous(true);

    assert_eq!(expander.expand_sync("COUNTER(a)-COUNTER(a)-COUNTER(b)"), "1-2-1");
    assert_eq!(expander.expand_sync("COUNTER(a)"), "3");
}
