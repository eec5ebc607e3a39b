//! Emulates a "disconnected" state on top of a protocol that has none.
//!
//! EIP-1193 gives the application no way to revoke the access it was granted,
//! so a disconnect is remembered locally: the connector writes
//! `"<connectorId>.connected"` when a connection is established and removes it
//! when the application asks to disconnect. The flag is advisory, a disconnect
//! coming from the provider itself is always honoured.

use crate::storage::{Storage, StorageError};
use std::rc::Rc;

const CONNECTED: &str = "true";

#[derive(Clone)]
pub struct DisconnectShim {
    key: String,
    storage: Option<Rc<dyn Storage>>,
}

impl DisconnectShim {
    pub fn new(connector_id: &str, storage: Option<Rc<dyn Storage>>) -> Self {
        Self {
            key: format!("{connector_id}.connected"),
            storage,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `true` only if the flag was persisted. Without a storage backend the
    /// connector never believes itself connected.
    pub async fn is_connected(&self) -> Result<bool, StorageError> {
        let Some(storage) = &self.storage else {
            return Ok(false);
        };
        let value = storage.get_item(&self.key).await?;
        Ok(value.is_some_and(|value| value == CONNECTED))
    }

    pub async fn set_connected(&self) -> Result<(), StorageError> {
        match &self.storage {
            Some(storage) => storage.set_item(&self.key, CONNECTED).await,
            None => Ok(()),
        }
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        match &self.storage {
            Some(storage) => storage.remove_item(&self.key).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use futures::executor::block_on;

    #[test]
    fn flag_round_trip() {
        let storage = Rc::new(MemoryStorage::new());
        let shim = DisconnectShim::new("metaMask", Some(storage.clone()));

        assert_eq!(shim.key(), "metaMask.connected");
        assert!(!block_on(shim.is_connected()).unwrap());

        block_on(shim.set_connected()).unwrap();
        assert!(storage.contains("metaMask.connected"));
        assert!(block_on(shim.is_connected()).unwrap());

        block_on(shim.clear()).unwrap();
        assert!(!block_on(shim.is_connected()).unwrap());
    }

    #[test]
    fn missing_storage_is_never_connected() {
        let shim = DisconnectShim::new("injected", None);

        block_on(shim.set_connected()).unwrap();
        assert!(!block_on(shim.is_connected()).unwrap());
        block_on(shim.clear()).unwrap();
    }
}
