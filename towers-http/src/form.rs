//! Form field names to JSON: `tag=a&tag=b` gives an array, `user[name]=x`
//! gives a nested object and `ids[]=1` always gives an array.

use serde_json::{Map, Value};

/// Deepest nesting honored; longer bracket paths stay flat keys
const MAX_DEPTH: usize = 5;

/// Collect decoded name/value pairs into one object
pub fn pairs_to_object(pairs: Vec<(String, String)>) -> Value {
    let mut fields = Map::new();
    for (name, value) in pairs {
        append_field(&mut fields, &name, Value::String(value));
    }
    Value::Object(fields)
}

/// Add one field, following bracket paths in `name`
pub fn append_field(fields: &mut Map<String, Value>, name: &str, value: Value) {
    let path = key_path(name);
    insert(fields, &path, value);
}

/// `a[b][]` splits into `["a", "b", ""]`; anything malformed is one flat key
fn key_path(name: &str) -> Vec<&str> {
    let Some(open) = name.find('[') else {
        return vec![name];
    };
    if open == 0 || !name.ends_with(']') {
        return vec![name];
    }

    let mut path = vec![&name[..open]];
    let mut rest = &name[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return vec![name];
        };
        path.push(&inner[..close]);
        rest = &inner[close + 1..];
    }

    if rest.is_empty() && path.len() <= MAX_DEPTH + 1 {
        path
    } else {
        vec![name]
    }
}

fn insert(fields: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };

    match rest {
        [] => append_value(fields, head, value),
        [""] => push_value(fields, head, value),
        _ => {
            let slot = fields
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                insert(inner, rest, value);
            }
        }
    }
}

/// Repeated names turn into an array
fn append_value(fields: &mut Map<String, Value>, name: &str, value: Value) {
    match fields.get_mut(name) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(name.to_string(), value);
        }
    }
}

/// `name[]` is an array even with a single value
fn push_value(fields: &mut Map<String, Value>, name: &str, value: Value) {
    let slot = fields
        .entry(name.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match slot {
        Value::Array(values) => values.push(value),
        existing => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(pairs: &[(&str, &str)]) -> Value {
        pairs_to_object(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_repeated_fields_become_arrays() {
        let body = parse(&[("tag", "a"), ("tag", "b"), ("tag", "c"), ("title", "x")]);
        assert_eq!(body, json!({"tag": ["a", "b", "c"], "title": "x"}));
    }

    #[test]
    fn test_bracket_paths_nest() {
        let body = parse(&[
            ("user[name]", "ada"),
            ("user[address][city]", "london"),
            ("ids[]", "1"),
            ("ids[]", "2"),
            ("one[]", "only"),
        ]);
        assert_eq!(
            body,
            json!({
                "user": {"name": "ada", "address": {"city": "london"}},
                "ids": ["1", "2"],
                "one": ["only"],
            })
        );
    }

    #[test]
    fn test_malformed_or_deep_keys_stay_flat() {
        let body = parse(&[
            ("[x]", "1"),
            ("a[b", "2"),
            ("a]b[", "3"),
            ("d[1][2][3][4][5][6]", "4"),
        ]);
        let fields = body.as_object().unwrap();
        assert_eq!(fields["[x]"], "1");
        assert_eq!(fields["a[b"], "2");
        assert_eq!(fields["a]b["], "3");
        assert_eq!(fields["d[1][2][3][4][5][6]"], "4");
    }

    #[test]
    fn test_scalar_replaced_by_nested_object() {
        let body = parse(&[("a", "flat"), ("a[b]", "deep")]);
        assert_eq!(body, json!({"a": {"b": "deep"}}));
    }
}
