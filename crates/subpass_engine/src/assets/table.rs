//! Named asset storage with stable typed handles

use slotmap::{DefaultKey, SlotMap};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use super::{AssetError, AssetResult};

/// Stable reference to an asset of type `T`
pub struct Handle<T> {
    key: DefaultKey,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(key: DefaultKey) -> Self {
        Self {
            key,
            _phantom: PhantomData,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.key).finish()
    }
}

/// Assets of one kind, looked up by name or by handle
pub struct AssetTable<T> {
    kind: &'static str,
    items: SlotMap<DefaultKey, T>,
    names: HashMap<String, DefaultKey>,
}

impl<T> AssetTable<T> {
    /// Empty table; `kind` names the asset type in errors
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: SlotMap::new(),
            names: HashMap::new(),
        }
    }

    /// Store `item` under `name`
    ///
    /// Re-inserting a name replaces the asset and keeps its handle.
    pub fn insert(&mut self, name: impl Into<String>, item: T) -> Handle<T> {
        let name = name.into();
        if let Some(&key) = self.names.get(&name) {
            if let Some(slot) = self.items.get_mut(key) {
                *slot = item;
                return Handle::new(key);
            }
        }
        let key = self.items.insert(item);
        self.names.insert(name, key);
        Handle::new(key)
    }

    /// Handle for `name`
    pub fn handle(&self, name: &str) -> AssetResult<Handle<T>> {
        self.names
            .get(name)
            .map(|&key| Handle::new(key))
            .ok_or_else(|| AssetError::UnknownAsset {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    /// Asset behind `handle`
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.key)
    }

    /// Asset stored under `name`
    pub fn get_by_name(&self, name: &str) -> AssetResult<&T> {
        let handle = self.handle(name)?;
        self.get(handle).ok_or_else(|| AssetError::UnknownAsset {
            kind: self.kind,
            name: name.to_string(),
        })
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing has been inserted
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Kind name used in errors
    pub const fn kind(&self) -> &'static str {
        self.kind
    }
}
