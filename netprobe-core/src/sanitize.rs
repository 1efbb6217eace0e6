//! Output sanitization (§4.9): strips terminal control sequences and
//! rewrites colon-bearing text so a MAC address or IPv6 literal embedded
//! in a tool result can't be mistaken for a protocol framing character
//! by a naive downstream line-based parser.

use serde_json::Value;

/// Strips ANSI CSI/OSC escape sequences and raw C0 control bytes, except
/// tab and newline, which are left alone so multi-line stdout still reads
/// naturally.
fn strip_control_sequences(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next == '\u{7}' {
                            break;
                        }
                    }
                }
                _ => {}
            }
            continue;
        }
        if c.is_control() && c != '\t' && c != '\n' {
            continue;
        }
        out.push(c);
    }
    out
}

/// Rewrites colons in `text` so downstream line-oriented protocols never
/// see one. Three shapes, tried in order:
/// - six or more colon-separated segments (a MAC address): every `:` -> `-`
/// - an IPv6 literal's `::` shorthand: `::` -> `--`, then any remaining
///   `:` -> `-`
/// - anything else with a bare `:`: `:` -> ` -`
fn rewrite_colons(text: &str) -> String {
    if text.contains(':') {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() >= 6 {
            return text.replace(':', "-");
        }
        if text.contains("::") {
            return text.replace("::", "--").replace(':', "-");
        }
        return text.replace(':', " -");
    }
    text.to_string()
}

/// Sanitizes a single text block. Idempotent: running this twice over
/// its own output reproduces the same string (§8 property 8), since
/// neither control-sequence stripping nor colon rewriting can reintroduce
/// the patterns they just removed.
pub fn sanitize_text(input: &str) -> String {
    rewrite_colons(&strip_control_sequences(input))
}

/// Recursively applies `sanitize_text` to every string leaf in a JSON
/// value, walking objects and arrays and leaving other scalar types
/// untouched.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), sanitize_value(v))).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mac_address_colons_become_hyphens() {
        assert_eq!(sanitize_text("aa:bb:cc:dd:ee:ff"), "aa-bb-cc-dd-ee-ff");
    }

    #[test]
    fn ipv6_shorthand_colons_become_hyphens() {
        assert_eq!(sanitize_text("fe80::1"), "fe80--1");
    }

    #[test]
    fn bare_colon_gets_a_leading_space() {
        assert_eq!(sanitize_text("error: timed out"), "error - timed out");
    }

    #[test]
    fn no_colon_is_unchanged() {
        assert_eq!(sanitize_text("no punctuation here"), "no punctuation here");
    }

    #[test]
    fn strips_ansi_color_codes() {
        assert_eq!(sanitize_text("\u{1b}[31merror\u{1b}[0m"), "error");
    }

    #[test]
    fn sanitizing_is_idempotent() {
        let samples = ["aa:bb:cc:dd:ee:ff", "fe80::1", "plain: text", "nothing"];
        for sample in samples {
            let once = sanitize_text(sample);
            let twice = sanitize_text(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn recurses_into_nested_structures() {
        let value = json!({"a": ["x: y", {"b": "aa:bb:cc:dd:ee:ff"}]});
        let sanitized = sanitize_value(&value);
        assert_eq!(sanitized["a"][0], json!("x - y"));
        assert_eq!(sanitized["a"][1]["b"], json!("aa-bb-cc-dd-ee-ff"));
    }
}
