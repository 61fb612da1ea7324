use std::fmt;

/// A resolver result. Anything that is not a string, number, boolean or null
/// is carried as `Invalid` and never reaches the output.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    Invalid(String),
}

impl Value {
    /// Coerce to the string that is substituted into the template.
    /// `None` means the value is not substitutable.
    pub fn coerce(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Null => Some(String::new()),
            Value::Invalid(_) => None,
        }
    }

    /// Falsy values are recorded as empty strings by the variable collector.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
            Value::Null => false,
            Value::Invalid(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
            Value::Invalid(_) => "object",
        }
    }
}

/// Render a number the way `String(n)` does in a browser: integral values
/// print without a fractional part, and magnitudes of `1e21` and above or
/// below `1e-6` use exponent form (`1e+21`, `1.5e-7`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.abs() >= 1e21 || n.abs() < 1e-6 {
        return exponent_form(n);
    }
    // Shortest round-trip digits, integral values without a fraction.
    format!("{}", n)
}

fn exponent_form(n: f64) -> String {
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Invalid(desc) => write!(f, "<invalid {}>", desc),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_primitives() {
        assert_eq!(Value::from("abc").coerce(), Some("abc".to_string()));
        assert_eq!(Value::from(3).coerce(), Some("3".to_string()));
        assert_eq!(Value::from(2.5).coerce(), Some("2.5".to_string()));
        assert_eq!(Value::from(true).coerce(), Some("true".to_string()));
        assert_eq!(Value::Null.coerce(), Some(String::new()));
        assert_eq!(Value::Invalid("map".into()).coerce(), None);
    }

    #[test]
    fn test_format_number_edges() {
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(-12.0), "-12");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_format_number_uses_exponent_outside_decimal_range() {
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-2.5e30), "-2.5e+30");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(999999999999999900000.0), "999999999999999900000");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(false).is_truthy());
        assert!(!Value::from(None::<String>).is_truthy());
        assert!(Value::from("0").is_truthy());
    }
}
