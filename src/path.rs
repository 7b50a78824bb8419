//! Dotted-path helpers over nested form values.
//!
//! Form values are JSON trees. A leaf path joins object keys and array
//! indices with `.` (`address.street`, `aliases.0`).

use serde_json::{Map, Value};

/// Collects the dotted path of every leaf under `value`.
///
/// Scalars, `null` and empty containers are leaves. A scalar root yields no
/// paths.
#[must_use]
pub fn leaf_paths(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect(child, key.clone(), &mut out);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                collect(child, idx.to_string(), &mut out);
            }
        }
        _ => {}
    }
    out
}

fn collect(value: &Value, prefix: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                collect(child, format!("{prefix}.{key}"), out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (idx, child) in items.iter().enumerate() {
                collect(child, format!("{prefix}.{idx}"), out);
            }
        }
        _ => out.push(prefix),
    }
}

/// Reads the value at `path`, if present.
#[must_use]
pub fn get_value<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

/// Writes `new_value` at `path`, creating intermediate objects as needed.
///
/// Numeric segments index into existing arrays; an index one past the end
/// appends. Any other non-container on the way is replaced by an object.
pub fn set_value(target: &mut Value, path: &str, new_value: Value) {
    if path.is_empty() {
        *target = new_value;
        return;
    }

    let mut current = target;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();

        let array_idx = match &*current {
            Value::Array(items) => segment.parse::<usize>().ok().filter(|idx| *idx <= items.len()),
            _ => None,
        };

        if let Some(idx) = array_idx {
            let Value::Array(items) = current else {
                return;
            };
            if idx == items.len() {
                items.push(Value::Null);
            }
            if last {
                items[idx] = new_value;
                return;
            }
            current = &mut items[idx];
            continue;
        }

        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if last {
            map.insert(segment.to_string(), new_value);
            return;
        }
        current = map.entry(segment.to_string()).or_insert(Value::Null);
    }
}

/// Keeps the parts of `incoming` whose paths also exist in `shape`.
///
/// The shape decides which paths exist; `incoming` decides their values.
/// Returns `None` when one side is a container and the other a leaf, or
/// when `incoming` has an empty container where `shape` has children.
#[must_use]
pub fn intersection(incoming: &Value, shape: &Value) -> Option<Value> {
    match (incoming, shape) {
        (Value::Object(inc), Value::Object(shp)) => {
            if inc.is_empty() && !shp.is_empty() {
                return None;
            }
            let mut out = Map::new();
            for (key, shape_child) in shp {
                if let Some(inc_child) = inc.get(key) {
                    if let Some(v) = intersection(inc_child, shape_child) {
                        out.insert(key.clone(), v);
                    }
                }
            }
            Some(Value::Object(out))
        }
        (Value::Array(inc), Value::Array(shp)) => {
            if inc.is_empty() && !shp.is_empty() {
                return None;
            }
            let items = inc
                .iter()
                .zip(shp.iter())
                .map(|(i, s)| intersection(i, s).unwrap_or_else(|| s.clone()))
                .collect();
            Some(Value::Array(items))
        }
        (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => None,
        (leaf, _) => Some(leaf.clone()),
    }
}

/// Merges `patch` into `base`: objects merge key by key, anything else is
/// replaced.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_child) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_child) => deep_merge(base_child, patch_child),
                    None => {
                        base_map.insert(key.clone(), patch_child.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Structural equality where `30` and `30.0` compare equal.
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, xv)| y.get(k).is_some_and(|yv| deep_equal(xv, yv)))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(xv, yv)| deep_equal(xv, yv))
        }
        _ => a == b,
    }
}
