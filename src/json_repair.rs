//! Lenient JSON repair for force-JSON mode.
//!
//! Strict-parses first; on failure, attempts a bounded set of textual
//! repairs — balancing `{}`/`[]`/`""`, stripping trailing commas, and
//! converting single to double quotes — then reparses. On repeated failure
//! returns the raw string unchanged and leaves it to the caller to log.

use serde_json::Value;

/// Attempts to parse `raw` as JSON, repairing common streaming-truncation
/// artifacts first. Returns `Ok(Value)` on success, or `Err(raw)` with the
/// original string when repair could not produce valid JSON.
pub fn repair_parse(raw: &str) -> Result<Value, String> {
    if let Ok(v) = serde_json::from_str(raw) {
        return Ok(v);
    }

    let repaired = repair(raw);
    match serde_json::from_str(&repaired) {
        Ok(v) => Ok(v),
        Err(_) => Err(raw.to_string()),
    }
}

fn repair(raw: &str) -> String {
    let mut s = strip_trailing_commas(raw.trim());
    s = balance_quotes(&s);
    s = single_to_double_quotes(&s);
    balance_brackets(&s)
}

fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut in_string = false;
    let mut escape = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }

        if c == ',' {
            let mut lookahead = chars.clone();
            let mut next_significant = None;
            while let Some(&n) = lookahead.peek() {
                if n.is_whitespace() {
                    lookahead.next();
                } else {
                    next_significant = Some(n);
                    break;
                }
            }
            if matches!(next_significant, Some('}') | Some(']')) {
                continue;
            }
        }

        out.push(c);
    }
    out
}

/// Closes an unterminated string literal at end-of-input (a streaming
/// response truncated mid-string).
fn balance_quotes(s: &str) -> String {
    let mut in_string = false;
    let mut escape = false;
    for c in s.chars() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        }
    }
    if in_string { format!("{s}\"") } else { s.to_string() }
}

/// Converts single-quoted string literals to double-quoted, a common
/// malformed-JSON pattern from models trained on Python-like output.
fn single_to_double_quotes(s: &str) -> String {
    if !s.contains('\'') || s.contains('"') {
        return s.to_string();
    }
    s.replace('\'', "\"")
}

fn balance_brackets(s: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    for c in s.chars() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    let mut out = s.to_string();
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_parse_succeeds_without_repair() {
        assert_eq!(repair_parse(r#"{"a":1}"#).unwrap(), serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_repairs_unbalanced_brace() {
        let v = repair_parse(r#"{"a": 1, "b": {"c": 2}"#).unwrap();
        assert_eq!(v["b"]["c"], 2);
    }

    #[test]
    fn test_repairs_unbalanced_bracket_and_quote() {
        let v = repair_parse(r#"{"items": ["a", "b"#).unwrap();
        assert!(v["items"].is_array());
    }

    #[test]
    fn test_strips_trailing_comma() {
        let v = repair_parse(r#"{"a": 1, "b": 2,}"#).unwrap();
        assert_eq!(v["b"], 2);
    }

    #[test]
    fn test_irrecoverable_input_returns_raw() {
        let err = repair_parse("not json at all, no braces").unwrap_err();
        assert_eq!(err, "not json at all, no braces");
    }
}
