//! Preset registry: graph loading, cycle detection, persistence hooks
//!
//! The registry owns every preset as an arena indexed by identifier; base
//! references are identifiers resolved through the arena, never raw
//! pointers. Loading resolves each document's base chain recursively with a
//! path-set cycle check, memoizing already-resolved presets so a shared base
//! is built exactly once no matter how many children reference it.

use crate::block::deep_merge;
use crate::preset::{Preset, ResolvedBase, ensure_uuid};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Capability through which the registry persists documents back to their
/// origin files. When no sink is installed, persistence is silently skipped.
pub trait DocumentSink: Send + Sync {
    /// Persists the raw documents belonging to one origin file.
    fn save(&self, file: &str, documents: &[Value]) -> Result<()>;
}

struct PendingDocument {
    data: Map<String, Value>,
    file: Option<String>,
}

/// Owns the identifier-to-preset arena and the load-order list.
#[derive(Default)]
pub struct Registry {
    presets: HashMap<String, Preset>,
    order: Vec<String>,
    by_file: HashMap<String, Vec<String>>,
    default_preset: Option<String>,
    sink: Option<Box<dyn DocumentSink>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry where documents that declare no `base` implicitly inherit
    /// the preset named `name` (unless they are that preset themselves).
    pub fn with_default_preset(name: impl Into<String>) -> Self {
        Self {
            default_preset: Some(name.into()),
            ..Self::default()
        }
    }

    /// Installs the persistence sink used by every mutating entry point.
    pub fn set_sink(&mut self, sink: Box<dyn DocumentSink>) {
        self.sink = Some(sink);
    }

    /// Loads a batch of raw documents, resolving every base chain.
    ///
    /// Missing uuids are generated first so later documents can reference
    /// earlier ones and vice versa. Fails with `DuplicateIdentifier` on a
    /// uuid collision (including against already-registered presets),
    /// `CyclicInheritance` when a document's base chain reaches itself, and
    /// `MissingDefault` when a default preset is configured but absent. A
    /// failed load rolls the registry back to its previous state.
    pub fn load(&mut self, documents: Vec<(Map<String, Value>, Option<String>)>) -> Result<()> {
        let mut pending = HashMap::new();
        let mut order = Vec::new();
        for (mut data, file) in documents {
            let uuid = ensure_uuid(&mut data)?;
            if pending.contains_key(&uuid) || self.presets.contains_key(&uuid) {
                return Err(Error::DuplicateIdentifier { uuid });
            }
            pending.insert(uuid.clone(), PendingDocument { data, file });
            order.push(uuid);
        }

        for uuid in &order {
            if let Err(error) = self.resolve(uuid, &pending, &order, &mut Vec::new()) {
                self.roll_back(&order);
                return Err(error);
            }
        }
        self.order.extend(order);
        tracing::debug!("Loaded {} presets", self.order.len());
        Ok(())
    }

    /// Looks a preset up by identifier.
    pub fn get(&self, uuid: &str) -> Result<&Preset> {
        self.presets.get(uuid).ok_or_else(|| Error::NotFound {
            name: uuid.to_string(),
        })
    }

    /// Mutable lookup, for cursor/try-number adjustments.
    pub fn get_mut(&mut self, uuid: &str) -> Result<&mut Preset> {
        self.presets.get_mut(uuid).ok_or_else(|| Error::NotFound {
            name: uuid.to_string(),
        })
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.presets.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every preset, in load order.
    pub fn all_presets(&self) -> Vec<&Preset> {
        self.order
            .iter()
            .filter_map(|uuid| self.presets.get(uuid))
            .collect()
    }

    /// Non-abstract presets, in load order.
    pub fn active_presets(&self) -> Vec<&Preset> {
        self.all_presets()
            .into_iter()
            .filter(|preset| !preset.is_abstract())
            .collect()
    }

    /// Non-abstract presets from one origin file, in load order.
    pub fn presets_by_file(&self, file: &str) -> Vec<&Preset> {
        self.all_presets()
            .into_iter()
            .filter(|preset| preset.file() == Some(file) && !preset.is_abstract())
            .collect()
    }

    /// Registers a single document at runtime. Its bases must already be
    /// registered. Persists the origin file when one is given.
    pub fn add_preset(
        &mut self,
        mut data: Map<String, Value>,
        file: Option<String>,
    ) -> Result<&Preset> {
        let uuid = ensure_uuid(&mut data)?;
        if self.presets.contains_key(&uuid) {
            return Err(Error::DuplicateIdentifier { uuid });
        }

        let mut base_refs = parse_base_field(&data)?;
        if base_refs.is_empty() {
            base_refs = self.registered_default_base(&data)?;
        }
        let mut resolved = Vec::with_capacity(base_refs.len());
        for (base_uuid, args) in base_refs {
            let base = self.get(&base_uuid)?;
            resolved.push(ResolvedBase {
                tree: base.block().merged_tree().clone(),
                dynamic: base.treat_dynamic(),
                uuid: base_uuid,
                args,
            });
        }

        let preset = Preset::new(data, resolved, file.clone())?;
        self.register(preset);
        self.order.push(uuid.clone());
        if let Some(file) = file {
            self.persist(&file)?;
        }
        self.get(&uuid)
    }

    /// Removes a preset from every index and persists its origin file.
    ///
    /// Never cascades: children that inherited from it keep the merged
    /// snapshot they were built with, and their dangling base references are
    /// the caller's responsibility.
    pub fn remove_preset(&mut self, uuid: &str) -> Result<Preset> {
        let preset = self.presets.remove(uuid).ok_or_else(|| Error::NotFound {
            name: uuid.to_string(),
        })?;
        self.order.retain(|entry| entry != uuid);
        if let Some(file) = preset.file() {
            if let Some(entries) = self.by_file.get_mut(file) {
                entries.retain(|entry| entry != uuid);
            }
            self.persist(file)?;
        }
        Ok(preset)
    }

    /// Deep-merges `patch` into a preset's raw config and persists its file.
    pub fn update_config(&mut self, uuid: &str, patch: &Value) -> Result<&Preset> {
        let preset = self.get_mut(uuid)?;
        preset.update_config(patch)?;
        let file = preset.file().map(str::to_string);
        if let Some(file) = file {
            self.persist(&file)?;
        }
        self.get(uuid)
    }

    /// Deep-merges `patch` into a preset's config at `timestep` (promoting
    /// it to dynamic if needed) and persists its file.
    pub fn set_config_at_timestep(
        &mut self,
        uuid: &str,
        patch: &Value,
        timestep: u64,
    ) -> Result<&Preset> {
        let preset = self.get_mut(uuid)?;
        preset.set_config_at_timestep(patch, timestep)?;
        let file = preset.file().map(str::to_string);
        if let Some(file) = file {
            self.persist(&file)?;
        }
        self.get(uuid)
    }

    /// Reconstructs the raw (pre-merge, type-preserving) config tree of a
    /// preset with its whole base chain folded in: bases first, self last,
    /// child wins, recursing on nested objects only. This is the same rule
    /// the block applies to merged trees.
    pub fn compose_config(&self, uuid: &str, force_dynamic: bool) -> Result<Value> {
        let preset = self.get(uuid)?;
        self.compose_inner(preset, force_dynamic)
    }

    /// The raw merged view at one timestep: every declared step at or below
    /// `timestep` folded together, most recent winning.
    pub fn compose_config_for_timestep(&self, uuid: &str, timestep: u64) -> Result<Value> {
        let preset = self.get(uuid)?;
        let mut composed = Value::Object(Map::new());
        for step in preset.block().valid_timesteps(timestep) {
            let mut single = self.compose_single_timestep(preset, step)?;
            // later steps were folded first and must keep winning
            deep_merge(&mut single, &composed);
            composed = single;
        }
        Ok(composed)
    }

    /// Persists every origin-file group through the sink.
    pub fn save(&self) -> Result<()> {
        for file in self.by_file.keys() {
            self.persist(file)?;
        }
        Ok(())
    }

    fn resolve(
        &mut self,
        uuid: &str,
        pending: &HashMap<String, PendingDocument>,
        order: &[String],
        path: &mut Vec<String>,
    ) -> Result<()> {
        if self.presets.contains_key(uuid) {
            return Ok(());
        }
        let Some(doc) = pending.get(uuid) else {
            return Err(Error::NotFound {
                name: uuid.to_string(),
            });
        };
        if path.iter().any(|ancestor| ancestor == uuid) {
            return Err(Error::CyclicInheritance {
                uuid: uuid.to_string(),
            });
        }
        path.push(uuid.to_string());

        let mut base_refs = parse_base_field(&doc.data)?;
        if base_refs.is_empty() {
            base_refs = self.pending_default_base(&doc.data, pending, order)?;
        }
        let mut resolved = Vec::with_capacity(base_refs.len());
        for (base_uuid, args) in base_refs {
            self.resolve(&base_uuid, pending, order, path)?;
            let (tree, dynamic) = {
                let base = self.get(&base_uuid)?;
                (base.block().merged_tree().clone(), base.treat_dynamic())
            };
            resolved.push(ResolvedBase {
                uuid: base_uuid,
                tree,
                dynamic,
                args,
            });
        }
        path.pop();

        let preset = Preset::new(doc.data.clone(), resolved, doc.file.clone())?;
        self.register(preset);
        Ok(())
    }

    fn register(&mut self, preset: Preset) {
        if let Some(file) = preset.file() {
            self.by_file
                .entry(file.to_string())
                .or_default()
                .push(preset.uuid().to_string());
        }
        self.presets.insert(preset.uuid().to_string(), preset);
    }

    fn roll_back(&mut self, batch: &[String]) {
        for uuid in batch {
            if let Some(preset) = self.presets.remove(uuid) {
                if let Some(file) = preset.file() {
                    if let Some(entries) = self.by_file.get_mut(file) {
                        entries.retain(|entry| entry != uuid);
                    }
                }
            }
        }
        self.by_file.retain(|_, entries| !entries.is_empty());
    }

    /// The implicit base for a document without one, searched among the
    /// pending batch first (in load order), then the registered presets.
    fn pending_default_base(
        &self,
        data: &Map<String, Value>,
        pending: &HashMap<String, PendingDocument>,
        order: &[String],
    ) -> Result<Vec<(String, Vec<Value>)>> {
        let Some(default_name) = self.default_preset.clone() else {
            return Ok(Vec::new());
        };
        if data.get("name").and_then(Value::as_str) == Some(default_name.as_str()) {
            return Ok(Vec::new());
        }
        for uuid in order {
            if let Some(doc) = pending.get(uuid) {
                if doc.data.get("name").and_then(Value::as_str) == Some(default_name.as_str()) {
                    return Ok(vec![(uuid.clone(), Vec::new())]);
                }
            }
        }
        self.registered_default_uuid(&default_name)
            .map(|uuid| vec![(uuid, Vec::new())])
    }

    fn registered_default_base(
        &self,
        data: &Map<String, Value>,
    ) -> Result<Vec<(String, Vec<Value>)>> {
        let Some(default_name) = self.default_preset.clone() else {
            return Ok(Vec::new());
        };
        if data.get("name").and_then(Value::as_str) == Some(default_name.as_str()) {
            return Ok(Vec::new());
        }
        self.registered_default_uuid(&default_name)
            .map(|uuid| vec![(uuid, Vec::new())])
    }

    fn registered_default_uuid(&self, default_name: &str) -> Result<String> {
        for uuid in &self.order {
            if let Some(preset) = self.presets.get(uuid) {
                if preset.name() == default_name {
                    return Ok(uuid.clone());
                }
            }
        }
        Err(Error::MissingDefault {
            name: default_name.to_string(),
        })
    }

    fn compose_inner(&self, preset: &Preset, force_dynamic: bool) -> Result<Value> {
        let mut own = Value::Object(preset.raw_config().clone());
        if !preset.is_dynamic() && (preset.treat_dynamic() || force_dynamic) {
            let mut keyed = Map::new();
            keyed.insert("0".to_string(), own);
            own = Value::Object(keyed);
        }
        let mut composed = Value::Object(Map::new());
        for base_ref in preset.bases() {
            let base = self.get(&base_ref.uuid)?;
            let tree = self.compose_inner(base, force_dynamic || preset.is_dynamic())?;
            deep_merge(&mut composed, &tree);
        }
        deep_merge(&mut composed, &own);
        Ok(composed)
    }

    fn compose_single_timestep(&self, preset: &Preset, timestep: u64) -> Result<Value> {
        let own = if preset.is_dynamic() {
            preset
                .raw_config()
                .get(&timestep.to_string())
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()))
        } else if timestep == 0 {
            Value::Object(preset.raw_config().clone())
        } else {
            Value::Object(Map::new())
        };
        let mut composed = Value::Object(Map::new());
        for base_ref in preset.bases() {
            let base = self.get(&base_ref.uuid)?;
            let tree = self.compose_single_timestep(base, timestep)?;
            deep_merge(&mut composed, &tree);
        }
        deep_merge(&mut composed, &own);
        Ok(composed)
    }

    fn persist(&self, file: &str) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let documents: Vec<Value> = self
            .order
            .iter()
            .filter_map(|uuid| self.presets.get(uuid))
            .filter(|preset| preset.file() == Some(file))
            .map(|preset| Value::Object(preset.raw_data().clone()))
            .collect();
        sink.save(file, &documents)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("order", &self.order)
            .field("default_preset", &self.default_preset)
            .finish_non_exhaustive()
    }
}

/// Parses the `base` field: a single identifier, or a list whose entries are
/// an identifier or an `[identifier, arg0, arg1, …]` array.
fn parse_base_field(data: &Map<String, Value>) -> Result<Vec<(String, Vec<Value>)>> {
    let Some(base) = data.get("base") else {
        return Ok(Vec::new());
    };
    match base {
        Value::String(uuid) => Ok(vec![(uuid.clone(), Vec::new())]),
        Value::Array(entries) => {
            let mut refs = Vec::with_capacity(entries.len());
            for entry in entries {
                match entry {
                    Value::String(uuid) => refs.push((uuid.clone(), Vec::new())),
                    Value::Array(parts) => match parts.first() {
                        Some(Value::String(uuid)) => {
                            refs.push((uuid.clone(), parts[1..].to_vec()));
                        }
                        _ => {
                            return Err(Error::InvalidDocument {
                                message: "a 'base' entry must start with an identifier"
                                    .to_string(),
                            });
                        }
                    },
                    _ => {
                        return Err(Error::InvalidDocument {
                            message: "a 'base' entry must be an identifier or a list".to_string(),
                        });
                    }
                }
            }
            Ok(refs)
        }
        _ => Err(Error::InvalidDocument {
            message: "'base' must be an identifier or a list of identifiers".to_string(),
        }),
    }
}
