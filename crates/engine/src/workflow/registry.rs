use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{definition::WorkflowDefinition, Error, Result};

/// Workflow definitions by key. Owned by a manager; entries are only ever
/// replaced, never dropped implicitly.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    entries: RwLock<HashMap<String, Arc<WorkflowDefinition>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition under its key, returning the definition it replaced.
    pub fn register(
        &self,
        definition: Arc<WorkflowDefinition>,
    ) -> Result<Option<Arc<WorkflowDefinition>>> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Error::Internal(format!("registry lock poisoned: {}", e)))?;
        Ok(entries.insert(definition.key().to_string(), definition))
    }

    pub fn get(&self, key: &str) -> Result<Arc<WorkflowDefinition>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Internal(format!("registry lock poisoned: {}", e)))?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Workflow definition '{}' is not registered", key)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
