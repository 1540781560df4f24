//! Merged configuration trees
//!
//! A [`ConfigBlock`] folds a preset's own raw tree over the merged trees of
//! its base presets and answers `/`-delimited path lookups against the
//! result. Inheritance is resolved here, once, at construction; runtime
//! lookup never walks the base chain.
//!
//! Internally the merged tree is always keyed by timestep: a flat tree is
//! wrapped under `"0"` so dynamic and static blocks share one lookup path.
//! Lookup scans the declared timesteps at or below the cursor, most recent
//! first, which gives sparse schedules their "last value sticks" semantics.

use crate::logger::{ChangeLog, ConfigLogger};
use crate::template;
use crate::{Error, Result, coerce};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// One inherited layer: the timestep-keyed merged tree of a base preset,
/// together with the positional template arguments the child supplied for it.
#[derive(Debug, Clone)]
pub struct Layer {
    pub tree: Map<String, Value>,
    pub args: Vec<Value>,
    pub dynamic: bool,
}

/// A merged, queryable configuration tree.
pub struct ConfigBlock {
    own: Map<String, Value>,
    layers: Vec<Layer>,
    dynamic: bool,
    merged: Map<String, Value>,
    log: Mutex<ChangeLog>,
}

impl ConfigBlock {
    /// Builds the merged tree by folding the base layers in order (least
    /// specific first) followed by the block's own tree, so conflicting leaf
    /// keys resolve child-wins.
    ///
    /// `own_dynamic` marks the own tree as already timestep-keyed; a flat
    /// tree is wrapped under `"0"`. The block itself counts as dynamic when
    /// its own tree or any layer is.
    pub fn new(own: Map<String, Value>, own_dynamic: bool, layers: Vec<Layer>) -> Result<Self> {
        let dynamic = own_dynamic || layers.iter().any(|layer| layer.dynamic);
        let keyed_own = keyed(own.clone(), own_dynamic)?;

        let mut merged = Map::new();
        for layer in &layers {
            let mut tree = Value::Object(layer.tree.clone());
            template::substitute_tree(&mut tree, &layer.args);
            if let Value::Object(tree) = tree {
                deep_merge_map(&mut merged, &tree);
            }
        }
        deep_merge_map(&mut merged, &keyed_own);

        Ok(Self {
            own,
            layers,
            dynamic,
            merged,
            log: Mutex::new(ChangeLog::default()),
        })
    }

    /// True when this block or any inherited layer varies by timestep.
    pub fn dynamic(&self) -> bool {
        self.dynamic
    }

    /// The inherited layers, in merge order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The merged tree in its internal, always timestep-keyed shape.
    pub fn merged_tree(&self) -> &Map<String, Value> {
        &self.merged
    }

    /// The merged config: timestep-keyed when the block is dynamic (or when
    /// forced), otherwise the unwrapped flat tree.
    pub fn merged_config(&self, force_dynamic: bool) -> Value {
        if force_dynamic || self.dynamic {
            Value::Object(self.merged.clone())
        } else {
            self.merged
                .get("0")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()))
        }
    }

    /// All declared timesteps, ascending.
    pub fn timesteps(&self) -> Vec<u64> {
        let mut steps: Vec<u64> = self.merged.keys().filter_map(|k| k.parse().ok()).collect();
        steps.sort_unstable();
        steps
    }

    /// Declared timesteps at or below `cursor`, most recent first.
    pub fn valid_timesteps(&self, cursor: u64) -> Vec<u64> {
        let mut steps: Vec<u64> = self
            .merged
            .keys()
            .filter_map(|k| k.parse().ok())
            .filter(|step| *step <= cursor)
            .collect();
        steps.sort_unstable_by(|a, b| b.cmp(a));
        steps
    }

    /// Resolves a `/`-delimited path at the given cursor, scanning valid
    /// timesteps most recent first. A value set at an early timestep stays
    /// visible until a later timestep overrides it.
    pub fn value_at(&self, path: &str, cursor: u64) -> Result<Value> {
        for timestep in self.valid_timesteps(cursor) {
            let Some(Value::Object(root)) = self.merged.get(&timestep.to_string()) else {
                continue;
            };
            if let Ok(value) = leaf_at(root, path) {
                if !value.is_object() {
                    return Ok(value.clone());
                }
            }
        }
        Err(Error::NotFound {
            name: path.to_string(),
        })
    }

    /// Resolves `path`, falling back to `fallback` when the primary path is
    /// absent at every timestep. A successful resolution is reported through
    /// the installed change log; logging never affects the returned value.
    pub fn value_with_fallback(
        &self,
        path: &str,
        fallback: Option<&str>,
        cursor: u64,
    ) -> Result<Value> {
        let value = match self.value_at(path, cursor) {
            Ok(value) => value,
            Err(Error::NotFound { .. }) => match fallback {
                Some(fallback) => self.value_at(fallback, cursor)?,
                None => {
                    return Err(Error::NotFound {
                        name: path.to_string(),
                    });
                }
            },
            Err(other) => return Err(other),
        };
        if let Ok(mut log) = self.log.lock() {
            log.observe(path, &value);
        }
        Ok(value)
    }

    pub fn get_int(&self, path: &str, fallback: Option<&str>, cursor: u64) -> Result<i64> {
        coerce::to_int(&self.value_with_fallback(path, fallback, cursor)?)
    }

    pub fn get_float(&self, path: &str, fallback: Option<&str>, cursor: u64) -> Result<f64> {
        coerce::to_float(&self.value_with_fallback(path, fallback, cursor)?)
    }

    pub fn get_bool(&self, path: &str, fallback: Option<&str>, cursor: u64) -> Result<bool> {
        coerce::to_bool(&self.value_with_fallback(path, fallback, cursor)?)
    }

    pub fn get_string(&self, path: &str, fallback: Option<&str>, cursor: u64) -> Result<String> {
        coerce::to_string(&self.value_with_fallback(path, fallback, cursor)?)
    }

    pub fn get_list(&self, path: &str, fallback: Option<&str>, cursor: u64) -> Result<Vec<Value>> {
        coerce::to_list(&self.value_with_fallback(path, fallback, cursor)?)
    }

    /// Immediate child keys (nested blocks and leaves) at `path`, addressed
    /// against the internal timestep-keyed tree.
    pub fn keys(&self, path: &str) -> Result<Vec<String>> {
        let block = descend(&self.merged, path)?;
        Ok(block.keys().cloned().collect())
    }

    /// Flattens the merged config into `"a/b/c" -> leaf` pairs, in key order.
    pub fn flatten(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        let presented = self.merged_config(false);
        if let Value::Object(map) = &presented {
            flatten_into("", map, &mut out);
        }
        out
    }

    /// Installs (or removes) the value logger. The seen-map is reset unless
    /// an explicit one is supplied, so logging starts from scratch.
    pub fn set_logger(
        &self,
        logger: Option<Arc<dyn ConfigLogger>>,
        seen: Option<HashMap<String, Value>>,
    ) {
        if let Ok(mut log) = self.log.lock() {
            *log = ChangeLog::new(logger, seen.unwrap_or_default());
        }
    }

    pub(crate) fn logger(&self) -> Option<Arc<dyn ConfigLogger>> {
        self.log.lock().ok().and_then(|log| log.logger())
    }
}

impl Clone for ConfigBlock {
    /// Deep copy: own tree, layers, and merged result are fully independent.
    /// The clone keeps the logger handle but starts a fresh logging session.
    fn clone(&self) -> Self {
        Self {
            own: self.own.clone(),
            layers: self.layers.clone(),
            dynamic: self.dynamic,
            merged: self.merged.clone(),
            log: Mutex::new(ChangeLog::new(self.logger(), HashMap::new())),
        }
    }
}

impl fmt::Debug for ConfigBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBlock")
            .field("dynamic", &self.dynamic)
            .field("merged", &self.merged)
            .finish_non_exhaustive()
    }
}

/// Deep merge of two JSON values: objects merge recursively, anything else
/// is replaced by `other`.
pub(crate) fn deep_merge(base: &mut Value, other: &Value) {
    match (base, other) {
        (Value::Object(base_map), Value::Object(other_map)) => {
            deep_merge_map(base_map, other_map);
        }
        (base, other) => *base = other.clone(),
    }
}

fn deep_merge_map(base: &mut Map<String, Value>, other: &Map<String, Value>) {
    for (key, other_value) in other {
        match base.get_mut(key) {
            Some(base_value) => deep_merge(base_value, other_value),
            None => {
                base.insert(key.clone(), other_value.clone());
            }
        }
    }
}

/// Wraps a flat tree under timestep `"0"`; a dynamic tree is validated to be
/// keyed by non-negative integers and passed through.
fn keyed(own: Map<String, Value>, own_dynamic: bool) -> Result<Map<String, Value>> {
    if !own_dynamic {
        let mut wrapped = Map::new();
        wrapped.insert("0".to_string(), Value::Object(own));
        return Ok(wrapped);
    }
    for key in own.keys() {
        if key.parse::<u64>().is_err() {
            return Err(Error::InvalidDocument {
                message: format!(
                    "dynamic config keys must be non-negative integers, got '{key}'"
                ),
            });
        }
    }
    Ok(own)
}

/// Walks `/`-delimited segments down nested blocks, failing with `NotFound`
/// when a segment is absent or not a block.
fn descend<'a>(
    mut block: &'a Map<String, Value>,
    path: &str,
) -> Result<&'a Map<String, Value>> {
    if path.is_empty() {
        return Ok(block);
    }
    for segment in path.split('/') {
        match block.get(segment) {
            Some(Value::Object(next)) => block = next,
            _ => {
                return Err(Error::NotFound {
                    name: segment.to_string(),
                });
            }
        }
    }
    Ok(block)
}

fn leaf_at<'a>(block: &'a Map<String, Value>, path: &str) -> Result<&'a Value> {
    let (parent, leaf) = match path.rfind('/') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    };
    let block = descend(block, parent)?;
    block.get(leaf).ok_or_else(|| Error::NotFound {
        name: leaf.to_string(),
    })
}

fn flatten_into(prefix: &str, block: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in block {
        match value {
            Value::Object(nested) => flatten_into(&format!("{prefix}{key}/"), nested, out),
            leaf => out.push((format!("{prefix}{key}"), leaf.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::test_support::RecordingLogger;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn flat_block(value: Value) -> ConfigBlock {
        ConfigBlock::new(object(value), false, Vec::new()).unwrap()
    }

    fn layer(value: Value, dynamic: bool) -> Layer {
        Layer {
            tree: object(value),
            args: Vec::new(),
            dynamic,
        }
    }

    #[test]
    fn own_leaf_wins_over_base_leaf() {
        let base = layer(json!({ "0": { "x": 2, "a": 25 } }), false);
        let block = ConfigBlock::new(object(json!({ "x": 8 })), false, vec![base]).unwrap();

        assert_eq!(block.get_int("x", None, 0).unwrap(), 8);
        assert_eq!(block.get_int("a", None, 0).unwrap(), 25);
    }

    #[test]
    fn nested_blocks_merge_recursively() {
        let base = layer(json!({ "0": { "opt": { "lr": 0.1, "decay": 0.9 } } }), false);
        let block =
            ConfigBlock::new(object(json!({ "opt": { "lr": 0.01 } })), false, vec![base]).unwrap();

        assert_eq!(block.get_float("opt/lr", None, 0).unwrap(), 0.01);
        assert_eq!(block.get_float("opt/decay", None, 0).unwrap(), 0.9);
    }

    #[test]
    fn scalar_replaces_nested_block_outright() {
        let base = layer(json!({ "0": { "opt": { "lr": 0.1 } } }), false);
        let block = ConfigBlock::new(object(json!({ "opt": "disabled" })), false, vec![base]).unwrap();

        assert_eq!(block.get_string("opt", None, 0).unwrap(), "disabled");
        assert!(matches!(
            block.get_float("opt/lr", None, 0),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn later_layer_wins_over_earlier() {
        let first = layer(json!({ "0": { "d": 1, "only_first": true } }), false);
        let second = layer(json!({ "0": { "d": 2 } }), false);
        let block = ConfigBlock::new(Map::new(), false, vec![first, second]).unwrap();

        assert_eq!(block.get_int("d", None, 0).unwrap(), 2);
        assert!(block.get_bool("only_first", None, 0).unwrap());
    }

    #[test]
    fn timestep_shadowing_keeps_last_defined_value() {
        let block = ConfigBlock::new(
            object(json!({ "0": { "z": 24, "w": 100 }, "10": { "z": 30 } })),
            true,
            Vec::new(),
        )
        .unwrap();

        assert_eq!(block.get_int("z", None, 0).unwrap(), 24);
        assert_eq!(block.get_int("z", None, 10).unwrap(), 30);
        assert_eq!(block.get_int("z", None, 20).unwrap(), 30);
        assert_eq!(block.get_int("w", None, 20).unwrap(), 100);
    }

    #[test]
    fn timestep_not_yet_reached_is_invisible() {
        let block =
            ConfigBlock::new(object(json!({ "5": { "z": 1 } })), true, Vec::new()).unwrap();

        assert!(matches!(
            block.get_int("z", None, 4),
            Err(Error::NotFound { .. })
        ));
        assert_eq!(block.get_int("z", None, 5).unwrap(), 1);
    }

    #[test]
    fn dynamic_layer_makes_block_dynamic() {
        let base = layer(json!({ "0": { "z": 24 }, "10": { "z": 30 } }), true);
        let block = ConfigBlock::new(object(json!({ "w": 150 })), false, vec![base]).unwrap();

        assert!(block.dynamic());
        assert_eq!(block.get_int("w", None, 10).unwrap(), 150);
        assert_eq!(block.get_int("z", None, 10).unwrap(), 30);
    }

    #[test]
    fn non_numeric_dynamic_keys_are_rejected() {
        let result = ConfigBlock::new(object(json!({ "start": { "z": 1 } })), true, Vec::new());
        assert!(matches!(result, Err(Error::InvalidDocument { .. })));
    }

    #[test]
    fn template_args_substitute_in_layers() {
        let base = Layer {
            tree: object(json!({ "0": { "width": "$T0$", "tag": "w$T0$" } })),
            args: vec![json!(128)],
            dynamic: false,
        };
        let block = ConfigBlock::new(Map::new(), false, vec![base]).unwrap();

        assert_eq!(block.get_int("width", None, 0).unwrap(), 128);
        assert_eq!(block.get_string("tag", None, 0).unwrap(), "w128");
    }

    #[test]
    fn fallback_resolves_when_primary_is_missing() {
        let block = flat_block(json!({ "present": 7 }));

        assert_eq!(block.get_int("missing", Some("present"), 0).unwrap(), 7);
        assert!(matches!(
            block.get_int("missing", Some("also_missing"), 0),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn type_conversion_is_not_masked_by_fallback() {
        let block = flat_block(json!({ "bad": "abc", "good": 1 }));

        assert!(matches!(
            block.get_int("bad", Some("good"), 0),
            Err(Error::TypeConversion { .. })
        ));
    }

    #[test]
    fn keys_lists_blocks_and_leaves() {
        let block = flat_block(json!({ "opt": { "lr": 0.1 }, "seed": 1 }));

        let mut keys = block.keys("0").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["opt", "seed"]);
        assert_eq!(block.keys("0/opt").unwrap(), vec!["lr"]);
        assert!(block.keys("0/nope").is_err());
    }

    #[test]
    fn flatten_joins_paths_with_slashes() {
        let block = flat_block(json!({ "a": 1, "b": { "c": 2 } }));

        assert_eq!(
            block.flatten(),
            vec![("a".to_string(), json!(1)), ("b/c".to_string(), json!(2))]
        );
    }

    #[test]
    fn merged_config_unwraps_static_blocks() {
        let block = flat_block(json!({ "x": 1 }));

        assert_eq!(block.merged_config(false), json!({ "x": 1 }));
        assert_eq!(block.merged_config(true), json!({ "0": { "x": 1 } }));
    }

    #[test]
    fn clone_is_independent() {
        let block = flat_block(json!({ "x": 1 }));
        let copy = block.clone();

        assert_eq!(copy.merged_config(false), block.merged_config(false));
        assert_eq!(copy.get_int("x", None, 0).unwrap(), 1);
    }

    #[test]
    fn lookups_report_through_the_change_log() {
        let logger = Arc::new(RecordingLogger::default());
        let block = ConfigBlock::new(
            object(json!({ "0": { "z": 24 }, "10": { "z": 30 } })),
            true,
            Vec::new(),
        )
        .unwrap();
        block.set_logger(Some(logger.clone()), None);

        block.get_int("z", None, 0).unwrap();
        block.get_int("z", None, 0).unwrap();
        block.get_int("z", None, 10).unwrap();

        let lines = logger.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                "Using z = 24".to_string(),
                "Switching z: 24 -> 30".to_string(),
            ]
        );
    }
}
