use std::path::Path;
use std::sync::RwLock;

use tracing::debug;

use super::{StockState, StockStore, UnitOfWork};
use crate::error::StoreError;

/// In-memory stock store.
///
/// One `RwLock` guards the whole state: units of work serialise on the writer
/// lock, reads share the reader lock. The state can be exported to and
/// imported from a JSON snapshot.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: RwLock<StockState>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: StockState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Serialize the committed state as pretty-printed JSON.
    pub fn export_snapshot(&self) -> Result<String, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(serde_json::to_string_pretty(&*state)?)
    }

    /// Build a store from a JSON snapshot.
    pub fn import_snapshot(json: &str) -> Result<Self, StoreError> {
        let state: StockState = serde_json::from_str(json)?;
        state
            .check_integrity()
            .map_err(StoreError::InvalidSnapshot)?;
        Ok(Self::from_state(state))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), bytes = json.len(), "loading snapshot");
        Self::import_snapshot(&json)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let json = self.export_snapshot()?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), "snapshot written");
        Ok(())
    }
}

impl StockStore for InMemoryStockStore {
    fn read<R>(&self, f: impl FnOnce(&StockState) -> R) -> Result<R, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&state))
    }

    fn transact<R, E>(
        &self,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;

        let (result, staged) = {
            let mut uow = UnitOfWork::new(&state);
            let result = f(&mut uow);
            (result, uow.into_staged())
        };

        match result {
            Ok(value) => {
                state.apply(staged);
                Ok(value)
            }
            Err(e) => {
                debug!("unit of work failed, staged changes discarded");
                Err(e)
            }
        }
    }
}
