//! Value sanitizer. Bounds the size of arbitrary structured data.
//!
//! Breadcrumb data comes from hooks and application code and can be
//! arbitrarily large. Before anything is stored it passes through a
//! [`Sanitizer`], which trims long strings, long arrays, wide objects and
//! deep nesting so a single record can never dominate a report.

use serde_json::{Map, Value};

/// Trims oversized values before they are stored.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, value: Value) -> Value;
}

/// Shape of a value as far as trimming is concerned.
enum Shape {
    Primitive,
    Text,
    Array,
    Object,
}

fn classify(value: &Value) -> Shape {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => Shape::Primitive,
        Value::String(_) => Shape::Text,
        Value::Array(_) => Shape::Array,
        Value::Object(_) => Shape::Object,
    }
}

/// Limits applied by [`DefaultSanitizer`].
#[derive(Debug, Clone, Copy)]
pub struct SanitizerLimits {
    pub max_string_len: usize,
    pub max_array_len: usize,
    pub max_object_keys: usize,
    pub max_depth: usize,
}

impl Default for SanitizerLimits {
    fn default() -> Self {
        Self {
            max_string_len: 200,
            max_array_len: 10,
            max_object_keys: 20,
            max_depth: 5,
        }
    }
}

/// The built-in sanitizer.
#[derive(Debug, Clone, Default)]
pub struct DefaultSanitizer {
    limits: SanitizerLimits,
}

impl DefaultSanitizer {
    pub fn new(limits: SanitizerLimits) -> Self {
        Self { limits }
    }

    fn walk(&self, value: Value, depth: usize) -> Value {
        match classify(&value) {
            Shape::Primitive => value,
            Shape::Text => match value {
                Value::String(s) => Value::String(truncate(s, self.limits.max_string_len)),
                other => other,
            },
            Shape::Array | Shape::Object if depth >= self.limits.max_depth => {
                Value::String("<deep object>".into())
            }
            Shape::Array => match value {
                Value::Array(items) => Value::Array(self.walk_array(items, depth)),
                other => other,
            },
            Shape::Object => match value {
                Value::Object(map) => Value::Object(self.walk_object(map, depth)),
                other => other,
            },
        }
    }

    fn walk_array(&self, items: Vec<Value>, depth: usize) -> Vec<Value> {
        let total = items.len();
        let mut out: Vec<Value> = items
            .into_iter()
            .take(self.limits.max_array_len)
            .map(|item| self.walk(item, depth + 1))
            .collect();
        if total > self.limits.max_array_len {
            out.push(Value::String(format!(
                "<{} more items...>",
                total - self.limits.max_array_len
            )));
        }
        out
    }

    fn walk_object(&self, map: Map<String, Value>, depth: usize) -> Map<String, Value> {
        let total = map.len();
        let mut out: Map<String, Value> = map
            .into_iter()
            .take(self.limits.max_object_keys)
            .map(|(key, item)| (key, self.walk(item, depth + 1)))
            .collect();
        if total > self.limits.max_object_keys {
            out.insert(
                "...".into(),
                Value::String(format!(
                    "<{} more keys...>",
                    total - self.limits.max_object_keys
                )),
            );
        }
        out
    }
}

impl Sanitizer for DefaultSanitizer {
    fn sanitize(&self, value: Value) -> Value {
        self.walk(value, 0)
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_pass_through() {
        let s = DefaultSanitizer::default();
        assert_eq!(s.sanitize(json!(42)), json!(42));
        assert_eq!(s.sanitize(json!(true)), json!(true));
        assert_eq!(s.sanitize(Value::Null), Value::Null);
    }

    #[test]
    fn long_strings_are_trimmed() {
        let s = DefaultSanitizer::default();
        let out = s.sanitize(json!("x".repeat(500)));
        let text = out.as_str().unwrap();
        assert_eq!(text.chars().count(), 201);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn long_arrays_get_a_marker() {
        let s = DefaultSanitizer::default();
        let items: Vec<u32> = (0..15).collect();
        let out = s.sanitize(json!(items));
        let arr = out.as_array().unwrap();
        assert_eq!(arr.len(), 11);
        assert_eq!(arr[10], json!("<5 more items...>"));
    }

    #[test]
    fn wide_objects_are_trimmed() {
        let s = DefaultSanitizer::default();
        let map: Map<String, Value> = (0..25).map(|i| (format!("k{i:02}"), json!(i))).collect();
        let out = s.sanitize(Value::Object(map));
        let obj = out.as_object().unwrap();
        assert_eq!(obj.len(), 21);
        assert_eq!(obj["..."], json!("<5 more keys...>"));
    }

    #[test]
    fn deep_nesting_is_replaced() {
        let s = DefaultSanitizer::new(SanitizerLimits {
            max_depth: 2,
            ..SanitizerLimits::default()
        });
        let out = s.sanitize(json!({ "a": { "b": { "c": 1 } } }));
        assert_eq!(out["a"]["b"], json!("<deep object>"));
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("héllo".into(), 10), "héllo");
        assert_eq!(truncate("héllo".into(), 2), "hé…");
    }
}
