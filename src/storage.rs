use futures::future::{self, LocalBoxFuture};
use std::{cell::RefCell, collections::HashMap};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Storage error on `{key}': {info}")]
pub struct StorageError {
    pub key: String,
    pub info: String,
}

/// Persistent key/value store the connector keeps its disconnect flag in.
///
/// Every operation may suspend, the connector never assumes a write is
/// visible before the returned future resolved.
pub trait Storage {
    fn get_item<'a>(&'a self, key: &'a str)
    -> LocalBoxFuture<'a, Result<Option<String>, StorageError>>;

    fn set_item<'a>(&'a self, key: &'a str, value: &'a str)
    -> LocalBoxFuture<'a, Result<(), StorageError>>;

    fn remove_item<'a>(&'a self, key: &'a str) -> LocalBoxFuture<'a, Result<(), StorageError>>;
}

/// In-process [`Storage`], values are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.borrow().contains_key(key)
    }
}

impl Storage for MemoryStorage {
    fn get_item<'a>(
        &'a self,
        key: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<String>, StorageError>> {
        let value = self.items.borrow().get(key).cloned();
        Box::pin(future::ready(Ok(value)))
    }

    fn set_item<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> LocalBoxFuture<'a, Result<(), StorageError>> {
        self.items
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Box::pin(future::ready(Ok(())))
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> LocalBoxFuture<'a, Result<(), StorageError>> {
        self.items.borrow_mut().remove(key);
        Box::pin(future::ready(Ok(())))
    }
}
