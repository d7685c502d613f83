//! Dense, auto-resizing storage keyed by a [`HandleId`], with a
//! registry + invalidation lifecycle that lets a `HandleArray` outlive
//! the graph that created it without becoming a dangling-access hazard.
//!
//! The owning graph keeps only a [`Weak`] reference to each array it
//! hands out (in a [`HandleArrayRegistry`]), so arrays are resized in
//! lockstep with node/edge allocation without the graph needing to keep
//! them alive. If every strong handle the caller held is dropped, the
//! array is simply gone; if the caller keeps a `HandleArray` around
//! after the graph itself is dropped, every subsequent access returns
//! [`GraphError::Invalidated`] instead of reading stale or dangling data.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::{GraphError, GraphResult};
use crate::handle::HandleId;

/// Object-safe resize/invalidate surface a [`HandleArrayRegistry`] can
/// hold onto without knowing the array's element type.
pub(crate) trait ResizableArray: Send + Sync {
    fn resize_to(&self, new_len: usize);
    fn invalidate(&self);
}

struct Shared<V> {
    data: RwLock<Vec<V>>,
    default: V,
    alive: AtomicBool,
}

impl<V> ResizableArray for Shared<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn resize_to(&self, new_len: usize) {
        let mut data = self.data.write();
        if data.len() < new_len {
            data.resize(new_len, self.default.clone());
        }
    }

    fn invalidate(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Dense storage associating a `V` with every live `HandleId<K>`.
///
/// Cloning a `HandleArray` is cheap (it shares the underlying buffer);
/// all clones observe the same data and the same invalidation state.
/// The same type serves both the single-writer-thread case and the
/// concurrent-readers case described for component/attribute lookups —
/// see [`LockingHandleArray`].
pub struct HandleArray<K, V> {
    shared: Arc<Shared<V>>,
    _kind: PhantomData<K>,
}

/// An alias for [`HandleArray`] used where callers specifically rely on
/// its internal `RwLock` to allow many concurrent readers alongside the
/// mutator thread (e.g. [`crate::component_tracker::ComponentTracker`]'s
/// per-node component-id lookup table). There is exactly one
/// implementation; the alias only documents intent at the call site.
pub type LockingHandleArray<K, V> = HandleArray<K, V>;

impl<K, V> Clone for HandleArray<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _kind: PhantomData,
        }
    }
}

impl<K, V> HandleArray<K, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new_with_len(default: V, len: usize) -> (Self, Arc<Shared<V>>) {
        let shared = Arc::new(Shared {
            data: RwLock::new(vec![default.clone(); len]),
            default,
            alive: AtomicBool::new(true),
        });
        (
            HandleArray {
                shared: Arc::clone(&shared),
                _kind: PhantomData,
            },
            shared,
        )
    }

    fn check_alive(&self) -> GraphResult<()> {
        if self.shared.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GraphError::Invalidated)
        }
    }

    pub fn get(&self, handle: HandleId<K>) -> GraphResult<V> {
        self.check_alive()?;
        let index = handle.index().ok_or(GraphError::NullHandle)?;
        let data = self.shared.data.read();
        data.get(index).cloned().ok_or(GraphError::OutOfRange {
            index,
            capacity: data.len(),
        })
    }

    pub fn set(&self, handle: HandleId<K>, value: V) -> GraphResult<()> {
        self.check_alive()?;
        let index = handle.index().ok_or(GraphError::NullHandle)?;
        let mut data = self.shared.data.write();
        let capacity = data.len();
        let slot = data.get_mut(index).ok_or(GraphError::OutOfRange { index, capacity })?;
        *slot = value;
        Ok(())
    }

    /// Applies `f` to the current value in place, without an intervening
    /// clone-out/clone-back round trip.
    pub fn update<F>(&self, handle: HandleId<K>, f: F) -> GraphResult<()>
    where
        F: FnOnce(&mut V),
    {
        self.check_alive()?;
        let index = handle.index().ok_or(GraphError::NullHandle)?;
        let mut data = self.shared.data.write();
        let capacity = data.len();
        let slot = data.get_mut(index).ok_or(GraphError::OutOfRange { index, capacity })?;
        f(slot);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shared.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_valid(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// A snapshot copy of every slot, in handle order. Used by the
    /// consistency checker and by tests; not on any mutation hot path.
    pub fn snapshot(&self) -> GraphResult<Vec<V>> {
        self.check_alive()?;
        Ok(self.shared.data.read().clone())
    }
}

/// Tracks every [`HandleArray`] a graph has handed out via a [`Weak`]
/// reference, so growing the graph also grows each live array, and
/// dropping the graph invalidates every array still reachable.
#[derive(Default)]
pub(crate) struct HandleArrayRegistry {
    arrays: parking_lot::Mutex<Vec<Weak<dyn ResizableArray>>>,
}

impl HandleArrayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create<K, V>(&self, default: V, len: usize) -> HandleArray<K, V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let (array, shared) = HandleArray::new_with_len(default, len);
        self.arrays.lock().push(Arc::downgrade(&shared) as Weak<dyn ResizableArray>);
        array
    }

    /// Grows every still-live array to at least `new_len`, dropping
    /// entries whose array has been fully dropped.
    pub fn resize_all(&self, new_len: usize) {
        let mut arrays = self.arrays.lock();
        arrays.retain(|weak| {
            if let Some(strong) = weak.upgrade() {
                strong.resize_to(new_len);
                true
            } else {
                false
            }
        });
    }

    /// Marks every still-live array as invalidated. Called from the
    /// owning graph's `Drop` impl.
    pub fn invalidate_all(&self) {
        let arrays = self.arrays.lock();
        for weak in arrays.iter() {
            if let Some(strong) = weak.upgrade() {
                strong.invalidate();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::NodeKind;

    type H = HandleId<NodeKind>;

    #[test]
    fn get_set_round_trip() {
        let registry = HandleArrayRegistry::new();
        let arr: HandleArray<NodeKind, i32> = registry.create(0, 4);
        arr.set(H::new(2), 42).unwrap();
        assert_eq!(arr.get(H::new(2)).unwrap(), 42);
        assert_eq!(arr.get(H::new(0)).unwrap(), 0);
    }

    #[test]
    fn resize_grows_with_default() {
        let registry = HandleArrayRegistry::new();
        let arr: HandleArray<NodeKind, i32> = registry.create(-1, 2);
        registry.resize_all(5);
        assert_eq!(arr.len(), 5);
        assert_eq!(arr.get(H::new(4)).unwrap(), -1);
    }

    #[test]
    fn null_handle_errors() {
        let registry = HandleArrayRegistry::new();
        let arr: HandleArray<NodeKind, i32> = registry.create(0, 4);
        assert_eq!(arr.get(H::null()), Err(GraphError::NullHandle));
    }

    #[test]
    fn out_of_range_errors() {
        let registry = HandleArrayRegistry::new();
        let arr: HandleArray<NodeKind, i32> = registry.create(0, 2);
        assert_eq!(
            arr.get(H::new(5)),
            Err(GraphError::OutOfRange { index: 5, capacity: 2 })
        );
    }

    #[test]
    fn invalidate_all_poisons_outstanding_clones() {
        let registry = HandleArrayRegistry::new();
        let arr: HandleArray<NodeKind, i32> = registry.create(0, 4);
        let arr_clone = arr.clone();
        registry.invalidate_all();
        assert!(!arr.is_valid());
        assert_eq!(arr_clone.get(H::new(0)), Err(GraphError::Invalidated));
    }

    #[test]
    fn dropped_array_is_pruned_from_registry() {
        let registry = HandleArrayRegistry::new();
        {
            let _arr: HandleArray<NodeKind, i32> = registry.create(0, 4);
            assert_eq!(registry.arrays.lock().len(), 1);
        }
        registry.resize_all(10); // triggers pruning of the dead weak ref
        assert_eq!(registry.arrays.lock().len(), 0);
    }
}
