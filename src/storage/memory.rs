use crate::error::StorageError;
use crate::storage::{PlayerData, ResponseStore};

/// Store backed by process memory. `save` keeps a persisted copy that the
/// next `load` restores.
///
/// Load and save failures can be injected to exercise the retry paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: PlayerData,
    persisted: Option<PlayerData>,
    failing_loads: u32,
    failing_saves: bool,
    loads: u32,
    saves: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose backing copy already holds `data`. Call `load` to read it.
    pub fn with_persisted(data: PlayerData) -> Self {
        Self {
            persisted: Some(data),
            ..Self::default()
        }
    }

    /// The next `count` calls to `load` fail.
    pub fn fail_next_loads(&mut self, count: u32) {
        self.failing_loads = count;
    }

    pub fn set_failing_saves(&mut self, failing: bool) {
        self.failing_saves = failing;
    }

    pub fn persisted(&self) -> Option<&PlayerData> {
        self.persisted.as_ref()
    }

    pub fn load_calls(&self) -> u32 {
        self.loads
    }

    pub fn save_calls(&self) -> u32 {
        self.saves
    }
}

impl ResponseStore for MemoryStore {
    fn load(&mut self) -> Result<(), StorageError> {
        self.loads += 1;
        if self.failing_loads > 0 {
            self.failing_loads -= 1;
            return Err(StorageError::Unavailable("injected load failure".into()));
        }
        self.data = self.persisted.clone().unwrap_or_default();
        Ok(())
    }

    fn save(&mut self) -> Result<(), StorageError> {
        self.saves += 1;
        if self.failing_saves {
            return Err(StorageError::Unavailable("injected save failure".into()));
        }
        self.data.last_active = crate::storage::unix_now();
        self.persisted = Some(self.data.clone());
        Ok(())
    }

    fn data(&self) -> &PlayerData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut PlayerData {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load_restores() {
        let mut store = MemoryStore::new();
        store.set_response(7, 3);
        store.save().unwrap();
        store.set_response(7, 5);
        store.load().unwrap();
        assert_eq!(store.response(7), 3);
        assert!(store.data().last_active > 0);
    }

    #[test]
    fn test_injected_failures() {
        let mut store = MemoryStore::new();
        store.fail_next_loads(2);
        assert!(store.load().is_err());
        assert!(store.load().is_err());
        assert!(store.load().is_ok());
        assert_eq!(store.load_calls(), 3);

        store.set_failing_saves(true);
        assert!(matches!(store.save(), Err(StorageError::Unavailable(_))));
        assert!(store.persisted().is_none());
    }
}
