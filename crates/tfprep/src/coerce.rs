//! scalar type coercion for raw command line tokens
//!
//! `-var count=3` should yield an integer, not the string `"3"`. [coerce] tries, in order:
//! 1. integer (`i64`)
//! 2. decimal (`f64`, finite only; `2e10` is a decimal)
//! 3. boolean (`true`, `false`, `t`, `f`; case-insensitive)
//! 4. quoted string: one layer of matching `'` or `"` is removed
//! 5. anything else is the trimmed string
//!
//! Blank input is returned unchanged.
use crate::value::Value;

pub fn coerce(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(raw.to_string());
    }

    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Integer(int);
    }

    // rust happily parses "inf" and "NaN", neither of which is a number a user meant to type
    if let Ok(decimal) = trimmed.parse::<f64>() {
        if decimal.is_finite() {
            return Value::Decimal(decimal);
        }
    }

    if let Some(boolean) = parse_bool(trimmed) {
        return Value::Boolean(boolean);
    }

    Value::String(unquote(trimmed).to_string())
}

fn parse_bool(token: &str) -> Option<bool> {
    match token.to_ascii_lowercase().as_str() {
        "true" | "t" => Some(true),
        "false" | "f" => Some(false),
        _ => None,
    }
}

fn unquote(token: &str) -> &str {
    for quote in ['"', '\''] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            return &token[1..token.len() - 1];
        }
    }

    token
}
