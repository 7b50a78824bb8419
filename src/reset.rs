//! Reset target computation.

use serde_json::{Number, Value};

use crate::action::ResetMode;
use crate::path::{get_value, leaf_paths, set_value};

/// Pure reset policy: computes the value a form should be reset to.
///
/// Missing snapshots resolve to an empty object rather than failing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResetPolicy;

impl ResetPolicy {
    /// Target for `mode`, given the current value and the recorded snapshots.
    #[must_use]
    pub fn target(
        mode: ResetMode,
        current: &Value,
        initial: Option<&Value>,
        submitted: Option<&Value>,
    ) -> Value {
        match mode {
            ResetMode::Initial => initial.cloned().unwrap_or_else(empty),
            ResetMode::Submitted => submitted.cloned().unwrap_or_else(empty),
            ResetMode::Blank => Self::blank(current),
        }
    }

    /// Blanks every recognized scalar leaf of `source`.
    ///
    /// Strings become `""`, integers `0`, floats `0.0`, booleans `false`.
    /// `null` and empty containers are left as they are.
    #[must_use]
    pub fn blank(source: &Value) -> Value {
        let mut target = source.clone();
        for path in leaf_paths(source) {
            let Some(blanked) = get_value(source, &path).and_then(blank_leaf) else {
                continue;
            };
            set_value(&mut target, &path, blanked);
        }
        target
    }
}

fn blank_leaf(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(Value::String(String::new())),
        Value::Bool(_) => Some(Value::Bool(false)),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(Value::Number(Number::from(0))),
        Value::Number(_) => Number::from_f64(0.0).map(Value::Number),
        _ => None,
    }
}

fn empty() -> Value {
    Value::Object(serde_json::Map::new())
}
