//! Small helpers for pulling typed values out of a probe's `args`
//! `serde_json::Value`, applying the parameter's declared default when
//! the caller omitted it. Kept deliberately tiny: probes stay in charge
//! of their own schema, this just avoids repeating `.get().and_then()`
//! chains in every probe body.

use serde_json::Value;

pub fn str_or<'a>(args: &'a Value, key: &str, default: &'a str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

pub fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

pub fn u32_or(args: &Value, key: &str, default: u32) -> u32 {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(default)
}

pub fn u16_or(args: &Value, key: &str, default: u16) -> u16 {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|v| v as u16)
        .unwrap_or(default)
}

pub fn bool_or(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub fn f64_or(args: &Value, key: &str, default: f64) -> f64 {
    args.get(key).and_then(Value::as_f64).unwrap_or(default)
}

pub fn str_list(args: &Value, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}
