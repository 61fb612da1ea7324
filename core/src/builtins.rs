//! Environment free macros: string helpers (`$SUBSTR`, `$REPLACE`, ...),
//! arithmetic, hashing, clocks and counters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{Local, SecondsFormat, Utc};
use regex::{Captures, Regex};
use sha2::{Digest, Sha384};

use crate::error::ResolverError;
use crate::resolver::{ResolverResult, arg};
use crate::source::Registry;
use crate::value::Value;

/// Install every built-in macro into `registry`.
pub fn register(registry: &mut Registry) {
    register_functions(registry);
    register_environment(registry);
}

pub fn register_functions(registry: &mut Registry) {
    registry
        .set("$DEFAULT", |args| Ok(default_macro(arg(args, 0), arg(args, 1)).into()))
        .set("$SUBSTR", |args| {
            substr_macro(arg(args, 0), arg(args, 1), args.get(2).map(String::as_str))
        })
        .set("$TRIM", |args| Ok(arg(args, 0).trim().into()))
        .set("$TOLOWERCASE", |args| Ok(arg(args, 0).to_lowercase().into()))
        .set("$TOUPPERCASE", |args| Ok(arg(args, 0).to_uppercase().into()))
        .set("$NOT", |args| Ok(arg(args, 0).is_empty().to_string().into()))
        .set("$BASE64", |args| Ok(base64_url_encode(arg(args, 0).as_bytes()).into()))
        .set_async("$HASH", |args: Vec<String>| async move {
            Ok(hash_macro(arg(&args, 0)).into())
        })
        .set("$IF", |args| {
            let branch = if string_to_bool(arg(args, 0)) { 1 } else { 2 };
            Ok(arg(args, branch).into())
        })
        .set("$REPLACE", |args| {
            replace_macro(arg(args, 0), arg(args, 1), arg(args, 2))
        })
        .set("$MATCH", |args| match_macro(arg(args, 0), arg(args, 1), arg(args, 2)))
        .set("$CALC", |args| {
            calc_macro(arg(args, 0), arg(args, 1), arg(args, 2), arg(args, 3))
        })
        .set("$EQUALS", |args| Ok((arg(args, 0) == arg(args, 1)).into()));
}

pub fn register_environment(registry: &mut Registry) {
    let counters: Arc<Mutex<HashMap<String, u64>>> = Arc::default();

    registry
        .set("RANDOM", |_| Ok(rand::random::<f64>().into()))
        .set("COUNTER", move |args| {
            let mut counters = counters
                .lock()
                .map_err(|_| ResolverError::new("COUNTER store is poisoned"))?;
            let count = counters.entry(arg(args, 0).to_string()).or_insert(0);
            *count += 1;
            Ok((*count).into())
        })
        .set("TIMESTAMP", |_| Ok(Utc::now().timestamp_millis().into()))
        .set("TIMESTAMP_ISO", |_| {
            Ok(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true).into())
        })
        // Minutes to add to local time to get UTC, like getTimezoneOffset.
        .set("TIMEZONE", |_| {
            let east = Local::now().offset().local_minus_utc();
            Ok((-(east / 60)).into())
        });
}

/// Truthiness of a macro argument.
pub fn string_to_bool(value: &str) -> bool {
    !matches!(value, "false" | "" | "0" | "null" | "NaN" | "undefined")
}

/// `Number(value)` for the inputs macros receive.
pub fn to_number(value: &str) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust would accept these, a browser does not.
        "inf" | "+inf" | "-inf" | "infinity" | "NaN" | "nan" => f64::NAN,
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

fn default_macro<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

fn substr_macro(value: &str, start: &str, length: Option<&str>) -> ResolverResult {
    let start = to_number(start);
    if !start.is_finite() {
        return Err(format!("Start index {} in substr macro should be a number", start).into());
    }

    let chars: Vec<char> = value.chars().collect();
    let size = chars.len() as f64;
    let mut count = size;
    if let Some(length) = length.filter(|l| !l.is_empty()) {
        count = to_number(length);
        if !count.is_finite() {
            return Err(format!("Length {} in substr macro should be a number", count).into());
        }
    }

    let start = start.trunc();
    let from = if start < 0.0 {
        (size + start).max(0.0)
    } else {
        start.min(size)
    };
    let to = (from + count.trunc().max(0.0)).min(size);
    if to <= from {
        return Ok(Value::from(""));
    }

    let text: String = chars[from as usize..to as usize].iter().collect();
    Ok(text.into())
}

fn replace_macro(value: &str, pattern: &str, replacement: &str) -> ResolverResult {
    if pattern.is_empty() {
        tracing::warn!(target: "Variables", "REPLACE macro must have two or more arguments");
    }
    let regex = Regex::new(pattern).map_err(|e| ResolverError::new(e.to_string()))?;
    let replaced = regex.replace_all(value, |caps: &Captures| {
        js_replacement(caps, value, replacement)
    });
    Ok(replaced.into_owned().into())
}

/// Expands a `String.prototype.replace` style template for one match:
/// `$$`, `$&`, `` $` ``, `$'` and `$1` to `$99`. Anything else is literal.
fn js_replacement(caps: &Captures, haystack: &str, template: &str) -> String {
    let bytes = template.as_bytes();
    let groups = caps.len() - 1;
    let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));

    let mut out = String::with_capacity(template.len());
    let mut literal = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        out.push_str(&template[literal..i]);
        let (text, used) = match bytes.get(i + 1) {
            Some(b'$') => ("$", 2),
            Some(b'&') => (group(caps, 0), 2),
            Some(b'`') => (&haystack[..start], 2),
            Some(b'\'') => (&haystack[end..], 2),
            Some(digit) if digit.is_ascii_digit() => {
                let one = (digit - b'0') as usize;
                let two = bytes
                    .get(i + 2)
                    .filter(|b| b.is_ascii_digit())
                    .map(|b| one * 10 + (b - b'0') as usize);
                match two {
                    Some(n) if (1..=groups).contains(&n) => (group(caps, n), 3),
                    _ if (1..=groups).contains(&one) => (group(caps, one), 2),
                    _ => ("$", 1),
                }
            }
            _ => ("$", 1),
        };
        out.push_str(text);
        i += used;
        literal = i;
    }
    out.push_str(&template[literal..]);
    out
}

fn group<'h>(caps: &Captures<'h>, index: usize) -> &'h str {
    caps.get(index).map_or("", |m| m.as_str())
}

fn match_macro(value: &str, pattern: &str, group: &str) -> ResolverResult {
    if pattern.is_empty() {
        tracing::warn!(target: "Variables", "MATCH macro must have two or more arguments");
    }

    let index = if group.is_empty() {
        0
    } else {
        match parse_int(group) {
            Some(index) if index >= 0 => index as usize,
            _ => {
                tracing::error!(target: "Variables", "Third argument in MATCH macro must be a number >= 0");
                0
            }
        }
    };

    let regex = Regex::new(pattern).map_err(|e| ResolverError::new(e.to_string()))?;
    let matched = regex
        .captures(value)
        .and_then(|caps| caps.get(index))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    Ok(matched.into())
}

fn calc_macro(left: &str, right: &str, operation: &str, round: &str) -> ResolverResult {
    let left = to_number(left);
    let right = to_number(right);
    if left.is_nan() {
        return Err("CALC macro - left operand must be a number".into());
    }
    if right.is_nan() {
        return Err("CALC macro - right operand must be a number".into());
    }

    let result = match operation {
        "add" => left + right,
        "subtract" => left - right,
        "multiply" => left * right,
        "divide" => {
            if right == 0.0 {
                return Err("CALC macro - cannot divide by 0".into());
            }
            left / right
        }
        _ => {
            tracing::error!(target: "Variables", "CALC macro - Invalid operation");
            0.0
        }
    };

    let result = if string_to_bool(round) {
        (result + 0.5).floor()
    } else {
        result
    };
    Ok(result.into())
}

fn hash_macro(value: &str) -> String {
    base64_url_encode(&Sha384::digest(value.as_bytes()))
}

/// URL safe base64 with `.` as the padding character.
pub fn base64_url_encode(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes).replace('=', ".")
}

/// Leading integer of `value`, like `parseInt(value, 10)`.
fn parse_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let digits_from = usize::from(trimmed.starts_with(['-', '+']));
    let digits = trimmed[digits_from..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|end| digits_from + end)
        .unwrap_or(trimmed.len());
    if digits == digits_from {
        return None;
    }
    trimmed[..digits].parse().ok()
}
