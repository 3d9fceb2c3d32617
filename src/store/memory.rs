//! In-memory artifact store for testing.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::error::{Result, VcError};

use super::{ArtifactKey, ArtifactKind, ArtifactStore};

/// An in-memory artifact store backed by a HashMap.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<ArtifactKey, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ArtifactKey, Vec<u8>>>> {
        self.data
            .lock()
            .map_err(|e| VcError::Io(std::io::Error::other(e.to_string())))
    }
}

impl ArtifactStore for MemoryStore {
    fn get_bytes(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put_bytes(&self, key: &ArtifactKey, value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &ArtifactKey) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn contains(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.lock()?.contains_key(key))
    }

    fn list(&self, kind: ArtifactKind, owner: &str) -> Result<Vec<ArtifactKey>> {
        let mut keys: Vec<ArtifactKey> = self
            .lock()?
            .keys()
            .filter(|key| key.kind == kind && key.owner == owner)
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
