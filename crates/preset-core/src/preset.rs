//! Preset entities: typed, prefix-scoped access over a merged block
//!
//! A `Preset` wraps one raw JSON document. Its inheritance chain is resolved
//! at construction into a single [`ConfigBlock`], so every getter is a local
//! lookup that never walks the base chain at runtime. Prefix views share the
//! block behind an `Arc` and diverge only in prefix and cursor.

use crate::block::{ConfigBlock, Layer, deep_merge};
use crate::logger::ConfigLogger;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// A base reference as declared by a document: the base preset's identifier
/// plus the positional template arguments supplied for it.
#[derive(Debug, Clone)]
pub struct BaseRef {
    pub uuid: String,
    pub args: Vec<Value>,
}

/// What a child needs from an already-constructed base preset to build its
/// own block: the base's merged timestep-keyed tree and dynamic flag.
#[derive(Debug, Clone)]
pub struct ResolvedBase {
    pub uuid: String,
    pub tree: Map<String, Value>,
    pub dynamic: bool,
    pub args: Vec<Value>,
}

/// A named, inheritable bundle of configuration settings.
#[derive(Clone)]
pub struct Preset {
    data: Map<String, Value>,
    uuid: String,
    name: String,
    file: Option<String>,
    is_abstract: bool,
    dynamic: bool,
    creation_time: DateTime<Utc>,
    bases: Vec<BaseRef>,
    block: Arc<ConfigBlock>,
    prefix: String,
    /// Which attempt of the experiment is current.
    pub try_number: u32,
    /// Which timestep lookups resolve against.
    pub iteration_cursor: u64,
}

impl Preset {
    /// Builds a preset from a raw document and its resolved bases.
    ///
    /// A missing `uuid` is generated, a missing `creation_time` defaults to
    /// now, and a missing `name` is derived from the flattened merged config;
    /// all three are written back into the document so they persist.
    pub fn new(
        mut data: Map<String, Value>,
        bases: Vec<ResolvedBase>,
        file: Option<String>,
    ) -> Result<Self> {
        let uuid = ensure_uuid(&mut data)?;

        let creation_time = match data.get("creation_time") {
            Some(Value::Number(n)) => {
                let seconds = n.as_f64().unwrap_or_default() as i64;
                DateTime::from_timestamp(seconds, 0).ok_or_else(|| Error::InvalidDocument {
                    message: format!("preset '{uuid}' has an out-of-range 'creation_time'"),
                })?
            }
            Some(_) => {
                return Err(Error::InvalidDocument {
                    message: format!("preset '{uuid}' has a non-numeric 'creation_time'"),
                });
            }
            None => {
                let now = Utc::now();
                data.insert(
                    "creation_time".to_string(),
                    Value::Number(now.timestamp().into()),
                );
                now
            }
        };

        let is_abstract = flag(&data, "abstract", &uuid)?;
        let dynamic = flag(&data, "dynamic", &uuid)?;

        let own = match data.get("config") {
            Some(Value::Object(config)) => config.clone(),
            _ => {
                return Err(Error::InvalidDocument {
                    message: format!("preset '{uuid}' has no 'config' object"),
                });
            }
        };

        let mut base_refs = Vec::with_capacity(bases.len());
        let mut layers = Vec::with_capacity(bases.len());
        for base in bases {
            layers.push(Layer {
                tree: base.tree,
                args: base.args.clone(),
                dynamic: base.dynamic,
            });
            base_refs.push(BaseRef {
                uuid: base.uuid,
                args: base.args,
            });
        }
        let block = ConfigBlock::new(own, dynamic, layers)?;

        let name = match data.get("name") {
            Some(Value::String(name)) => name.clone(),
            _ => {
                let generated = generated_name(&block);
                data.insert("name".to_string(), Value::String(generated.clone()));
                generated
            }
        };

        Ok(Self {
            data,
            uuid,
            name,
            file,
            is_abstract,
            dynamic,
            creation_time,
            bases: base_refs,
            block: Arc::new(block),
            prefix: String::new(),
            try_number: 0,
            iteration_cursor: 0,
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Abstract presets exist only to be inherited from and are excluded
    /// from active result sets.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Whether this preset itself declares per-timestep variation.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Whether this preset or any transitive base varies by timestep.
    /// Dynamism is contagious: a flat child of a dynamic base must still
    /// interpret the base's schedule.
    pub fn treat_dynamic(&self) -> bool {
        self.block.dynamic()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn bases(&self) -> &[BaseRef] {
        &self.bases
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn block(&self) -> &ConfigBlock {
        &self.block
    }

    /// The raw document, including metadata fields.
    pub fn raw_data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// The raw `config` field as declared (timestep-keyed for dynamic
    /// presets, flat otherwise).
    pub fn raw_config(&self) -> &Map<String, Value> {
        match self.data.get("config") {
            Some(Value::Object(config)) => config,
            _ => unreachable!("document invariant: 'config' is an object"),
        }
    }

    pub fn get_int(&self, name: &str, fallback: Option<&str>) -> Result<i64> {
        let fallback = fallback.map(|f| self.scoped(f));
        self.block
            .get_int(&self.scoped(name), fallback.as_deref(), self.iteration_cursor)
    }

    pub fn get_float(&self, name: &str, fallback: Option<&str>) -> Result<f64> {
        let fallback = fallback.map(|f| self.scoped(f));
        self.block
            .get_float(&self.scoped(name), fallback.as_deref(), self.iteration_cursor)
    }

    pub fn get_bool(&self, name: &str, fallback: Option<&str>) -> Result<bool> {
        let fallback = fallback.map(|f| self.scoped(f));
        self.block
            .get_bool(&self.scoped(name), fallback.as_deref(), self.iteration_cursor)
    }

    pub fn get_string(&self, name: &str, fallback: Option<&str>) -> Result<String> {
        let fallback = fallback.map(|f| self.scoped(f));
        self.block
            .get_string(&self.scoped(name), fallback.as_deref(), self.iteration_cursor)
    }

    pub fn get_list(&self, name: &str, fallback: Option<&str>) -> Result<Vec<Value>> {
        let fallback = fallback.map(|f| self.scoped(f));
        self.block
            .get_list(&self.scoped(name), fallback.as_deref(), self.iteration_cursor)
    }

    /// Resolves a value without coercion.
    pub fn get_value(&self, name: &str, fallback: Option<&str>) -> Result<Value> {
        let fallback = fallback.map(|f| self.scoped(f));
        self.block.value_with_fallback(
            &self.scoped(name),
            fallback.as_deref(),
            self.iteration_cursor,
        )
    }

    /// Immediate child keys at `name`. Static presets address the flat view;
    /// dynamic presets address timesteps explicitly.
    pub fn get_keys(&self, name: &str) -> Result<Vec<String>> {
        let path = if self.treat_dynamic() {
            name.to_string()
        } else if name.is_empty() {
            "0".to_string()
        } else {
            format!("0/{name}")
        };
        self.block.keys(&path)
    }

    /// A lightweight view sharing this preset's block and identity, with the
    /// prefix extended by `prefix + "/"`. Cursor and try number are
    /// snapshotted and diverge from the original afterward.
    pub fn get_with_prefix(&self, prefix: &str) -> Preset {
        let mut view = self.clone();
        view.prefix = format!("{}{}/", self.prefix, prefix);
        view
    }

    /// A fully independent copy: the block is deep-cloned, so no mutable
    /// state is shared with the original.
    pub fn deep_clone(&self) -> Preset {
        let mut copy = self.clone();
        copy.block = Arc::new(self.block.as_ref().clone());
        copy
    }

    /// The merged config tree; `force_dynamic` keeps the timestep keying
    /// even for static presets.
    pub fn merged_config(&self, force_dynamic: bool) -> Value {
        self.block.merged_config(force_dynamic)
    }

    /// The raw document with `config` swapped for the merged tree.
    pub fn merged_data(&self) -> Map<String, Value> {
        let mut data = self.data.clone();
        data.insert("config".to_string(), self.merged_config(false));
        data
    }

    /// Deep-merges `patch` into the raw config and rebuilds the block over
    /// the retained base layers.
    pub fn update_config(&mut self, patch: &Value) -> Result<()> {
        if !patch.is_object() {
            return Err(Error::InvalidDocument {
                message: "config patch must be a nested object".to_string(),
            });
        }
        if let Some(config) = self.data.get_mut("config") {
            deep_merge(config, patch);
        }
        self.rebuild()
    }

    /// Deep-merges `patch` into the subtree at `timestep`, promoting a flat
    /// preset to dynamic first (the existing config moves under `"0"` and
    /// the document records `dynamic: true`).
    pub fn set_config_at_timestep(&mut self, patch: &Value, timestep: u64) -> Result<()> {
        if !patch.is_object() {
            return Err(Error::InvalidDocument {
                message: "config patch must be a nested object".to_string(),
            });
        }
        if !self.dynamic {
            let flat = self
                .data
                .get("config")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            let mut keyed = Map::new();
            keyed.insert("0".to_string(), flat);
            self.data.insert("config".to_string(), Value::Object(keyed));
            self.data.insert("dynamic".to_string(), Value::Bool(true));
            self.dynamic = true;
        }
        if let Some(Value::Object(config)) = self.data.get_mut("config") {
            let slot = config
                .entry(timestep.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            deep_merge(slot, patch);
        }
        self.rebuild()
    }

    /// Stores an extra document field (anything besides the reserved
    /// `config`, which must go through [`Preset::update_config`]).
    pub fn set_metadata(&mut self, name: &str, value: Value) -> Result<()> {
        if name == "config" {
            return Err(Error::InvalidDocument {
                message: "'config' cannot be set through metadata".to_string(),
            });
        }
        self.data.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get_metadata(&self, name: &str) -> Result<&Value> {
        self.data.get(name).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    pub fn has_metadata(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Installs the value logger on the shared block; the change log starts
    /// from scratch.
    pub fn set_logger(&self, logger: Option<Arc<dyn ConfigLogger>>) {
        self.block.set_logger(logger, None);
    }

    /// The experiment name shown in run listings.
    pub fn experiment_name(&self) -> String {
        format!("{} (try {})", self.name, self.try_number)
    }

    fn scoped(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn rebuild(&mut self) -> Result<()> {
        let own = self.raw_config().clone();
        let logger = self.block.logger();
        let block = ConfigBlock::new(own, self.dynamic, self.block.layers().to_vec())?;
        block.set_logger(logger, None);
        self.block = Arc::new(block);
        Ok(())
    }
}

impl std::fmt::Debug for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preset")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("file", &self.file)
            .field("abstract", &self.is_abstract)
            .field("dynamic", &self.dynamic)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Returns the document's uuid, generating and recording one when absent.
pub(crate) fn ensure_uuid(data: &mut Map<String, Value>) -> Result<String> {
    match data.get("uuid") {
        Some(Value::String(uuid)) => Ok(uuid.clone()),
        Some(_) => Err(Error::InvalidDocument {
            message: "'uuid' must be a string".to_string(),
        }),
        None => {
            let uuid = Uuid::new_v4().to_string();
            data.insert("uuid".to_string(), Value::String(uuid.clone()));
            Ok(uuid)
        }
    }
}

fn flag(data: &Map<String, Value>, field: &str, uuid: &str) -> Result<bool> {
    match data.get(field) {
        None => Ok(false),
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(Error::InvalidDocument {
            message: format!("preset '{uuid}' has a non-boolean '{field}'"),
        }),
    }
}

fn generated_name(block: &ConfigBlock) -> String {
    let parts: Vec<String> = block
        .flatten()
        .iter()
        .map(|(key, value)| format!("{key}: {}", crate::coerce::display(value)))
        .collect();
    if parts.is_empty() {
        "empty".to_string()
    } else {
        parts.join(" - ")
    }
}
