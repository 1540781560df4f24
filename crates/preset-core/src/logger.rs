//! Configuration value logging capability
//!
//! Long experiment runs want a record of which configuration values were
//! actually in effect, and when a schedule switched them. The core reports
//! these through an injected [`ConfigLogger`]; when none is installed the
//! calls are silently skipped.

use crate::coerce;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Capability through which the core reports configuration value usage.
///
/// Called synchronously and expected not to fail; implementations must
/// tolerate concurrent callers.
pub trait ConfigLogger: Send + Sync {
    fn log(&self, message: &str);
}

/// Remembers the last value reported per key, so repeated lookups stay quiet
/// until the value actually changes.
#[derive(Default)]
pub(crate) struct ChangeLog {
    logger: Option<Arc<dyn ConfigLogger>>,
    seen: HashMap<String, Value>,
}

impl ChangeLog {
    pub(crate) fn new(logger: Option<Arc<dyn ConfigLogger>>, seen: HashMap<String, Value>) -> Self {
        Self { logger, seen }
    }

    pub(crate) fn logger(&self) -> Option<Arc<dyn ConfigLogger>> {
        self.logger.clone()
    }

    /// Reports a resolved value: `Using` on first observation, `Switching`
    /// when it differs from the last one reported for the same key.
    pub(crate) fn observe(&mut self, key: &str, value: &Value) {
        let Some(logger) = &self.logger else {
            return;
        };
        match self.seen.get(key) {
            Some(previous) if previous == value => {}
            Some(previous) => {
                logger.log(&format!(
                    "Switching {}: {} -> {}",
                    key,
                    coerce::display(previous),
                    coerce::display(value)
                ));
                self.seen.insert(key.to_string(), value.clone());
            }
            None => {
                logger.log(&format!("Using {} = {}", key, coerce::display(value)));
                self.seen.insert(key.to_string(), value.clone());
            }
        }
    }
}
