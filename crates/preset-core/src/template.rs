//! Positional template substitution for parameterized inheritance
//!
//! A base reference may carry positional arguments, turning the base into a
//! mixin: its string leaves may mention `$T0$`, `$T1$`, … and each child
//! supplies its own values for them.

use serde_json::Value;

/// Applies positional `$T<i>$` substitution to a single string leaf.
///
/// When the whole leaf equals a token, the argument replaces it wholesale and
/// keeps its type; string arguments are first parsed as JSON (so `"42"`
/// substitutes as a number), falling back to the raw string. Otherwise every
/// token occurrence inside the leaf is replaced by the argument's string
/// rendering.
pub fn substitute(leaf: &str, args: &[Value]) -> Value {
    for (i, arg) in args.iter().enumerate() {
        if leaf == token(i) {
            return wholesale(arg);
        }
    }
    let mut out = leaf.to_string();
    for (i, arg) in args.iter().enumerate() {
        let token = token(i);
        if out.contains(&token) {
            out = out.replace(&token, &rendering(arg));
        }
    }
    Value::String(out)
}

/// Applies [`substitute`] to every string leaf of a tree, in place.
pub(crate) fn substitute_tree(tree: &mut Value, args: &[Value]) {
    if args.is_empty() {
        return;
    }
    match tree {
        Value::String(leaf) => *tree = substitute(leaf, args),
        Value::Object(map) => {
            for value in map.values_mut() {
                substitute_tree(value, args);
            }
        }
        Value::Array(items) => {
            for value in items {
                substitute_tree(value, args);
            }
        }
        _ => {}
    }
}

fn token(i: usize) -> String {
    format!("$T{i}$")
}

fn wholesale(arg: &Value) -> Value {
    match arg {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        other => other.clone(),
    }
}

fn rendering(arg: &Value) -> String {
    match arg {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
