//! Resource Database
//!
//! The single source of truth for "what is currently loaded": one name→handle
//! map per resource kind. The shape follows the engine's asset storage
//! (`RwLock<FxHashMap>` behind a cheap façade) with one extra invariant that
//! hot reload depends on:
//!
//! **A resource's allocation never moves once created.** Other subsystems
//! (renderer, ECS components, material→texture bindings) hold clones of the
//! [`Handle`], and a handle is a shared pointer to a locked slot. Updates
//! during hot reload write new *contents* through the existing slot's lock
//! ([`Handle::replace`]) and never swap the allocation itself, so every
//! previously obtained handle observes the new contents at the old address.
//!
//! Only the main-thread publisher is permitted to call [`Handle::replace`]
//! on live resources; the scanner and async loaders only ever fill their own
//! private staging databases.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use crate::resources::{Material, Model, ResourceKind, Script, Shader, Texture};

// ============================================================================
// Handle
// ============================================================================

/// Shared-ownership handle to one resource slot.
///
/// Cloning is cheap (an `Arc` bump) and clones always refer to the same
/// allocation. `ptr_eq` is the address-stability witness used by the
/// hot-reload tests.
#[derive(Debug)]
pub struct Handle<T>(Arc<RwLock<T>>);

impl<T> Handle<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Read access to the resource contents.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// Write access. Outside of tests, only the publisher's merge and the
    /// soft-link resolver take this on live resources.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Moves `value` into the existing allocation, returning the previous
    /// contents. The allocation (and thus every outstanding clone of this
    /// handle) is untouched.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.0.write(), value)
    }

    /// Whether two handles share one allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Handle<T>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

// ============================================================================
// ResourceMap
// ============================================================================

/// Name → handle map for one resource kind.
pub struct ResourceMap<T> {
    inner: RwLock<FxHashMap<String, Handle<T>>>,
}

impl<T> Default for ResourceMap<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<T> ResourceMap<T> {
    /// Inserts a new resource under `name`, returning its handle. Replaces
    /// the *mapping* if the name already exists (staging-side use only; on
    /// the live database, use [`merge_from`](Self::merge_from)).
    pub fn insert(&self, name: impl Into<String>, value: T) -> Handle<T> {
        let handle = Handle::new(value);
        self.inner.write().insert(name.into(), handle.clone());
        handle
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Handle<T>> {
        self.inner.read().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().len() == 0
    }

    /// Snapshot of the current names (sorted, so iteration order is
    /// deterministic for the resolver and the tests).
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Snapshot of the current handles, sorted by name.
    #[must_use]
    pub fn handles(&self) -> Vec<(String, Handle<T>)> {
        let mut entries: Vec<(String, Handle<T>)> = self
            .inner
            .read()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Merges a staged map into this (live) one: for names that already
    /// exist the staged contents are moved into the existing allocation,
    /// preserving the address other holders see; new names are inserted
    /// with their staged allocation. Returns how many entries moved.
    pub fn merge_from(&self, staged: ResourceMap<T>) -> usize
    where
        T: Clone,
    {
        let staged = staged.inner.into_inner();
        let mut merged = 0;
        for (name, staged_handle) in staged {
            // The staging database is exclusively owned at this point, so
            // the staged Arc normally unwraps without contention. A clone
            // that escaped before publish falls back to copying through
            // the lock.
            let value = match Arc::try_unwrap(staged_handle.0) {
                Ok(lock) => lock.into_inner(),
                Err(arc) => arc.read().clone(),
            };
            match self.get(&name) {
                Some(live) => {
                    live.replace(value);
                }
                None => {
                    self.insert(name, value);
                }
            }
            merged += 1;
        }
        merged
    }
}

// ============================================================================
// ResourceDatabase
// ============================================================================

/// Sharded mapping from resource kind to its [`ResourceMap`].
///
/// The live database is owned by the [`ResourceManager`]
/// (`crate::manager::ResourceManager`) and mutated only on the main thread;
/// staging databases are private to the scanner or an async load task.
#[derive(Default)]
pub struct ResourceDatabase {
    pub shaders: ResourceMap<Shader>,
    pub textures: ResourceMap<Texture>,
    pub materials: ResourceMap<Material>,
    pub models: ResourceMap<Model>,
    pub scripts: ResourceMap<Script>,

    /// Load-in-progress guard: `(kind, name)` pairs currently being
    /// converted/loaded somewhere. Replaces the original design's racy
    /// placeholder insertion; duplicate work is skipped instead of raced,
    /// and last-writer-wins merging keeps results correct either way.
    in_flight: Mutex<FxHashSet<(ResourceKind, String)>>,
}

impl ResourceDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generic lookup: `db.get::<Texture>("brick")`.
    #[must_use]
    pub fn get<T: ResourceType>(&self, name: &str) -> Option<Handle<T>> {
        T::map(self).get(name)
    }

    #[must_use]
    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        match kind {
            ResourceKind::Shader => self.shaders.contains(name),
            ResourceKind::Texture => self.textures.contains(name),
            ResourceKind::Material => self.materials.contains(name),
            ResourceKind::Model => self.models.contains(name),
            ResourceKind::Script => self.scripts.contains(name),
        }
    }

    #[must_use]
    pub fn total_len(&self) -> usize {
        self.shaders.len()
            + self.textures.len()
            + self.materials.len()
            + self.models.len()
            + self.scripts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Tries to claim `(kind, name)` for loading. `false` means another
    /// loader already claimed it and the caller should skip the work.
    pub fn begin_load(&self, kind: ResourceKind, name: &str) -> bool {
        self.in_flight.lock().insert((kind, name.to_string()))
    }

    /// Releases a claim taken by [`begin_load`](Self::begin_load).
    pub fn end_load(&self, kind: ResourceKind, name: &str) {
        self.in_flight.lock().remove(&(kind, name.to_string()));
    }
}

/// Maps a concrete resource type to its map inside the database, enabling
/// the generic `get::<T>` lookup the renderer and ECS consume.
pub trait ResourceType: Sized {
    const KIND: ResourceKind;
    fn map(db: &ResourceDatabase) -> &ResourceMap<Self>;
}

impl ResourceType for Shader {
    const KIND: ResourceKind = ResourceKind::Shader;
    fn map(db: &ResourceDatabase) -> &ResourceMap<Self> {
        &db.shaders
    }
}

impl ResourceType for Texture {
    const KIND: ResourceKind = ResourceKind::Texture;
    fn map(db: &ResourceDatabase) -> &ResourceMap<Self> {
        &db.textures
    }
}

impl ResourceType for Material {
    const KIND: ResourceKind = ResourceKind::Material;
    fn map(db: &ResourceDatabase) -> &ResourceMap<Self> {
        &db.materials
    }
}

impl ResourceType for Model {
    const KIND: ResourceKind = ResourceKind::Model;
    fn map(db: &ResourceDatabase) -> &ResourceMap<Self> {
        &db.models
    }
}

impl ResourceType for Script {
    const KIND: ResourceKind = ResourceKind::Script;
    fn map(db: &ResourceDatabase) -> &ResourceMap<Self> {
        &db.scripts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_generic_get() {
        let db = ResourceDatabase::new();
        db.textures.insert("brick", Texture::fallback("brick"));
        let handle = db.get::<Texture>("brick").unwrap();
        assert_eq!(handle.read().name, "brick");
        assert!(db.get::<Texture>("missing").is_none());
    }

    #[test]
    fn merge_preserves_existing_allocation() {
        let live: ResourceMap<Texture> = ResourceMap::default();
        let before = live.insert("brick", Texture::fallback("brick"));

        let staged: ResourceMap<Texture> = ResourceMap::default();
        let mut updated = Texture::fallback("brick");
        updated.pixels = vec![1, 2, 3, 4];
        staged.insert("brick", updated);

        live.merge_from(staged);

        let after = live.get("brick").unwrap();
        assert!(before.ptr_eq(&after));
        assert_eq!(before.read().pixels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn merge_inserts_new_names() {
        let live: ResourceMap<Texture> = ResourceMap::default();
        let staged: ResourceMap<Texture> = ResourceMap::default();
        staged.insert("new_one", Texture::fallback("new_one"));
        assert_eq!(live.merge_from(staged), 1);
        assert!(live.contains("new_one"));
    }

    #[test]
    fn in_flight_guard_claims_once() {
        let db = ResourceDatabase::new();
        assert!(db.begin_load(ResourceKind::Texture, "brick"));
        assert!(!db.begin_load(ResourceKind::Texture, "brick"));
        db.end_load(ResourceKind::Texture, "brick");
        assert!(db.begin_load(ResourceKind::Texture, "brick"));
    }
}
