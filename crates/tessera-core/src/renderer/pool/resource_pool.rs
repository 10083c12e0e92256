// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::renderer::api::ContextId;
use crate::renderer::context::{ContextListener, ListenerId, RenderingContext};
use crate::renderer::error::{ContextError, ResourceError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

/// An object that can live in a [`ResourcePool`].
pub trait PooledObject: Send + Sized + 'static {
    /// Sub-pool key besides the owning context.
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Builds a new object on a pool miss. `id` is unique within the pool.
    fn create(context: &Arc<RenderingContext>, key: &Self::Key, id: u64) -> Result<Self, ResourceError>;

    /// Pool-unique id passed to [`PooledObject::create`].
    fn id(&self) -> u64;

    /// Restores the canonical empty configuration before reuse.
    fn reset(&mut self);

    /// Releases native objects. `context` is `None` when the owning context
    /// is gone or was recreated since the object was built.
    fn destroy(self, context: Option<&RenderingContext>);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubPoolKey<K> {
    context: ContextId,
    epoch: u64,
    key: K,
}

struct PoolInner<T: PooledObject> {
    free: HashMap<SubPoolKey<T::Key>, Vec<T>>,
    subscriptions: HashMap<ContextId, (Weak<RenderingContext>, ListenerId)>,
    next_id: u64,
    constructed: usize,
}

/// A pool of [`PooledObject`]s shared by every context of a render system.
pub struct ResourcePool<T: PooledObject> {
    name: &'static str,
    inner: Mutex<PoolInner<T>>,
    self_ref: Weak<ResourcePool<T>>,
}

impl<T: PooledObject> Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ResourcePool")
            .field("name", &self.name)
            .field("sub_pools", &inner.free.len())
            .field("constructed", &inner.constructed)
            .finish()
    }
}

impl<T: PooledObject> ResourcePool<T> {
    /// Creates an empty pool. `name` only shows up in logs.
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            name,
            inner: Mutex::new(PoolInner {
                free: HashMap::new(),
                subscriptions: HashMap::new(),
                next_id: 1,
                constructed: 0,
            }),
            self_ref: self_ref.clone(),
        })
    }

    /// Takes a free object for `(context, key)` or builds a new one.
    pub fn acquire(&self, context: &Arc<RenderingContext>, key: T::Key) -> Result<Pooled<T>, ResourceError> {
        if !context.is_valid() {
            return Err(ResourceError::Context(ContextError::InvalidContext));
        }
        let sub_pool = SubPoolKey {
            context: context.id(),
            epoch: context.epoch(),
            key,
        };

        let id = {
            let mut inner = self.inner.lock();
            if let Some(object) = inner.free.get_mut(&sub_pool).and_then(Vec::pop) {
                log::trace!("ResourcePool '{}': reused object {} for {:?}.", self.name, object.id(), sub_pool);
                return Ok(Pooled::new(self.self_ref.clone(), sub_pool, context, object));
            }
            let id = inner.next_id;
            inner.next_id += 1;
            id
        };

        self.ensure_subscribed(context);
        // Construction talks to the driver, so it runs outside the pool lock.
        let object = T::create(context, &sub_pool.key, id)?;
        self.inner.lock().constructed += 1;
        log::debug!("ResourcePool '{}': created object {id} for {:?}.", self.name, sub_pool);
        Ok(Pooled::new(self.self_ref.clone(), sub_pool, context, object))
    }

    fn ensure_subscribed(&self, context: &Arc<RenderingContext>) {
        let mut inner = self.inner.lock();
        if inner.subscriptions.contains_key(&context.id()) {
            return;
        }
        let weak: Weak<dyn ContextListener> = self.self_ref.clone() as Weak<dyn ContextListener>;
        let listener = context.subscribe(weak);
        inner
            .subscriptions
            .insert(context.id(), (Arc::downgrade(context), listener));
    }

    /// Number of objects built since the pool was created.
    pub fn constructed_count(&self) -> usize {
        self.inner.lock().constructed
    }

    /// Number of objects waiting for reuse, across all contexts.
    pub fn free_count(&self) -> usize {
        self.inner.lock().free.values().map(Vec::len).sum()
    }

    /// Number of objects waiting for reuse in `context`.
    pub fn free_count_for(&self, context: ContextId) -> usize {
        self.inner
            .lock()
            .free
            .iter()
            .filter(|(key, _)| key.context == context)
            .map(|(_, objects)| objects.len())
            .sum()
    }

    fn release(&self, sub_pool: SubPoolKey<T::Key>, context: &Weak<RenderingContext>, mut object: T) {
        object.reset();
        let live = context
            .upgrade()
            .filter(|c| c.is_valid() && c.epoch() == sub_pool.epoch);

        if live.is_some() {
            let mut inner = self.inner.lock();
            if inner.subscriptions.contains_key(&sub_pool.context) {
                let objects = inner.free.entry(sub_pool).or_default();
                debug_assert!(
                    objects.iter().all(|o| o.id() != object.id()),
                    "object {} released twice",
                    object.id()
                );
                objects.push(object);
                return;
            }
        }

        log::trace!(
            "ResourcePool '{}': destroying object {} of a gone sub-pool {:?}.",
            self.name,
            object.id(),
            sub_pool
        );
        object.destroy(live.as_deref());
    }

    /// Destroys every free object of `context` and drops its sub-pools.
    pub fn purge(&self, context: ContextId) {
        let purged: Vec<T> = {
            let mut inner = self.inner.lock();
            let keys: Vec<_> = inner
                .free
                .keys()
                .filter(|key| key.context == context)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| inner.free.remove(&key))
                .flatten()
                .collect()
        };
        if !purged.is_empty() {
            log::debug!("ResourcePool '{}': purged {} objects of {context}.", self.name, purged.len());
        }
        for object in purged {
            object.destroy(None);
        }
    }
}

impl<T: PooledObject> ContextListener for ResourcePool<T> {
    fn on_context_destroyed(&self, context: &RenderingContext) {
        self.purge(context.id());
        if context.is_destroyed() {
            self.inner.lock().subscriptions.remove(&context.id());
        }
    }
}

impl<T: PooledObject> Drop for ResourcePool<T> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        for (key, objects) in inner.free.drain() {
            let context = inner
                .subscriptions
                .get(&key.context)
                .and_then(|(weak, _)| weak.upgrade())
                .filter(|c| c.is_valid() && c.epoch() == key.epoch);
            for object in objects {
                object.destroy(context.as_deref());
            }
        }
        for (_, (weak, listener)) in inner.subscriptions.drain() {
            if let Some(context) = weak.upgrade() {
                context.unsubscribe(listener);
            }
        }
    }
}

/// An object on loan from a [`ResourcePool`].
///
/// Dereferences to the object. Dropping it resets the object and returns it
/// to its sub-pool, or destroys it if the sub-pool is gone.
pub struct Pooled<T: PooledObject> {
    pool: Weak<ResourcePool<T>>,
    sub_pool: SubPoolKey<T::Key>,
    context: Weak<RenderingContext>,
    // `None` only while dropping.
    object: Option<T>,
}

impl<T: PooledObject + Debug> Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("context", &self.sub_pool.context)
            .field("epoch", &self.sub_pool.epoch)
            .field("object", &self.object)
            .finish()
    }
}

impl<T: PooledObject> Pooled<T> {
    fn new(pool: Weak<ResourcePool<T>>, sub_pool: SubPoolKey<T::Key>, context: &Arc<RenderingContext>, object: T) -> Self {
        Self {
            pool,
            sub_pool,
            context: Arc::downgrade(context),
            object: Some(object),
        }
    }

    /// Context the object was built for.
    pub fn context_id(&self) -> ContextId {
        self.sub_pool.context
    }

    /// Context epoch the object was built in.
    pub fn epoch(&self) -> u64 {
        self.sub_pool.epoch
    }

    /// Sub-pool key of the object.
    pub fn key(&self) -> &T::Key {
        &self.sub_pool.key
    }
}

impl<T: PooledObject> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.object.as_ref() {
            Some(object) => object,
            None => unreachable!("pooled object used after release"),
        }
    }
}

impl<T: PooledObject> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.object.as_mut() {
            Some(object) => object,
            None => unreachable!("pooled object used after release"),
        }
    }
}

impl<T: PooledObject> Drop for Pooled<T> {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        match self.pool.upgrade() {
            Some(pool) => pool.release(self.sub_pool.clone(), &self.context, object),
            None => {
                let context = self
                    .context
                    .upgrade()
                    .filter(|c| c.is_valid() && c.epoch() == self.sub_pool.epoch);
                object.destroy(context.as_deref());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::ContextConfig;
    use crate::renderer::headless::HeadlessDriver;
    use crate::renderer::RenderSystem;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct Slot {
        id: u64,
        dirty: bool,
    }

    impl PooledObject for Slot {
        type Key = u8;

        fn create(_context: &Arc<RenderingContext>, _key: &u8, id: u64) -> Result<Self, ResourceError> {
            Ok(Self { id, dirty: false })
        }

        fn id(&self) -> u64 {
            self.id
        }

        fn reset(&mut self) {
            self.dirty = false;
        }

        fn destroy(self, _context: Option<&RenderingContext>) {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup() -> (RenderSystem, Arc<RenderingContext>) {
        let system = RenderSystem::new(Arc::new(HeadlessDriver::new()), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("a")).unwrap();
        (system, context)
    }

    #[test]
    fn test_batch_round_trip_constructs_nothing_new() {
        let (_system, context) = setup();
        let pool = ResourcePool::<Slot>::new("slots");

        let first: Vec<_> = (0..5).map(|_| pool.acquire(&context, 0).unwrap()).collect();
        let mut ids: Vec<u64> = first.iter().map(|p| p.id()).collect();
        assert_eq!(pool.constructed_count(), 5);
        drop(first);
        assert_eq!(pool.free_count(), 5);

        let second: Vec<_> = (0..5).map(|_| pool.acquire(&context, 0).unwrap()).collect();
        let mut again: Vec<u64> = second.iter().map(|p| p.id()).collect();
        assert_eq!(pool.constructed_count(), 5);
        assert_eq!(pool.free_count(), 0);
        ids.sort_unstable();
        again.sort_unstable();
        assert_eq!(ids, again);
    }

    #[test]
    fn test_release_resets_and_reuses() {
        let (_system, context) = setup();
        let pool = ResourcePool::<Slot>::new("slots");

        let mut first = pool.acquire(&context, 0).unwrap();
        first.dirty = true;
        let id = first.id();
        drop(first);
        assert_eq!(pool.free_count(), 1);

        let again = pool.acquire(&context, 0).unwrap();
        assert_eq!(again.id(), id);
        assert!(!again.dirty);
        assert_eq!(pool.constructed_count(), 1);

        let other_key = pool.acquire(&context, 1).unwrap();
        assert_ne!(other_key.id(), id);
        assert_eq!(pool.constructed_count(), 2);
    }

    #[test]
    fn test_context_loss_purges_and_destroys_stragglers() {
        let (_system, context) = setup();
        let pool = ResourcePool::<Slot>::new("slots");
        let held = pool.acquire(&context, 0).unwrap();
        drop(pool.acquire(&context, 0).unwrap());
        assert_eq!(pool.free_count_for(context.id()), 1);

        let before = DESTROYED.load(Ordering::SeqCst);
        context.recreate().unwrap();
        assert_eq!(pool.free_count(), 0);

        // Built in the previous epoch: destroyed instead of pooled.
        drop(held);
        assert_eq!(pool.free_count(), 0);
        assert!(DESTROYED.load(Ordering::SeqCst) >= before + 2);
    }
}
