//! Handler registry: per-event-type invoker lists with snapshot isolation.
//!
//! Every list is an immutable `Arc<Vec<_>>` replaced wholesale on mutation,
//! so a dispatch holding a snapshot is unaffected by concurrent register or
//! unregister calls. Structural changes are serialized by a mutex; reads are
//! lock-free. A version counter increments on every structural change and
//! invalidates cached dispatch plans.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tracing::debug;

use crate::error::EventError;
use crate::subscriber::{ErasedSubscriber, HandlerDescriptor};

/// Identity of a registered subscriber instance: the address of the `Arc`
/// allocation. Stable while the registry holds its strong reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

impl SubscriberId {
    pub(crate) fn of<S: Any + Send + Sync>(subscriber: &Arc<S>) -> Self {
        Self(Arc::as_ptr(subscriber) as *const () as usize)
    }
}

/// An invoker bound to one subscriber instance, placed in registry entries.
pub(crate) struct BoundInvoker {
    pub(crate) descriptor: Arc<HandlerDescriptor>,
    pub(crate) subscriber: SubscriberId,
    /// Global registration sequence; the stable tie-break among equal
    /// priorities, within and across event types.
    pub(crate) seq: u64,
    /// A `BoundCall<K>` erased by event-type key.
    pub(crate) call: Box<dyn Any + Send + Sync>,
}

/// One handler bound during registration, before the registry assigns its
/// sequence number.
pub(crate) struct PendingInvoker {
    pub(crate) descriptor: Arc<HandlerDescriptor>,
    pub(crate) call: Box<dyn Any + Send + Sync>,
}

struct Entry {
    /// Sorted by descending priority, then ascending sequence.
    invokers: ArcSwap<Vec<Arc<BoundInvoker>>>,
}

impl Entry {
    fn new() -> Self {
        Self {
            invokers: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

struct Registered {
    /// Strong reference keeping the subscriber alive until unregistration.
    _instance: ErasedSubscriber,
    name: &'static str,
    event_types: Vec<TypeId>,
    handler_count: usize,
}

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    entries: DashMap<TypeId, Entry>,
    registered: DashMap<SubscriberId, Registered>,
    /// Serializes register/unregister; never held during dispatch reads.
    mutation: Mutex<()>,
    seq: AtomicU64,
    version: AtomicU64,
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Commits a fully validated, fully bound registration. Atomic: the
    /// duplicate-instance check precedes any structural change.
    pub(crate) fn register(
        &self,
        id: SubscriberId,
        instance: ErasedSubscriber,
        name: &'static str,
        invokers: Vec<PendingInvoker>,
    ) -> Result<usize, EventError> {
        let _guard = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);

        if self.registered.contains_key(&id) {
            let method = invokers
                .first()
                .map(|pending| pending.descriptor.method)
                .unwrap_or("<none>");
            return Err(EventError::DuplicateHandler {
                subscriber: name,
                method,
            });
        }

        let mut event_types = Vec::new();
        let count = invokers.len();
        for pending in invokers {
            let bound = Arc::new(BoundInvoker {
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                subscriber: id,
                descriptor: pending.descriptor,
                call: pending.call,
            });

            let event_type = bound.descriptor.event_type;
            if !event_types.contains(&event_type) {
                event_types.push(event_type);
            }

            let entry = self.entries.entry(event_type).or_default();
            let current = entry.invokers.load();
            let position = current
                .partition_point(|other| other.descriptor.priority >= bound.descriptor.priority);

            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend_from_slice(&current[..position]);
            next.push(bound);
            next.extend_from_slice(&current[position..]);
            entry.invokers.store(Arc::new(next));
        }

        self.registered.insert(
            id,
            Registered {
                _instance: instance,
                name,
                event_types,
                handler_count: count,
            },
        );
        self.version.fetch_add(1, Ordering::Release);
        Ok(count)
    }

    /// Removes every invoker bound to the subscriber. Returns `false` for an
    /// instance that was never registered; that is not an error.
    pub(crate) fn unregister(&self, id: SubscriberId) -> bool {
        let _guard = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);

        let Some((_, registered)) = self.registered.remove(&id) else {
            return false;
        };

        for event_type in &registered.event_types {
            let mut drop_entry = false;
            if let Some(entry) = self.entries.get(event_type) {
                let current = entry.invokers.load();
                let next: Vec<_> = current
                    .iter()
                    .filter(|bound| bound.subscriber != id)
                    .cloned()
                    .collect();
                if next.is_empty() {
                    drop_entry = true;
                } else {
                    entry.invokers.store(Arc::new(next));
                }
            }
            // The entry guard must be released before removal; mutations are
            // serialized, so nothing re-populates the entry in between.
            if drop_entry {
                self.entries.remove(event_type);
            }
        }

        self.version.fetch_add(1, Ordering::Release);
        debug!(
            "🧹 unregistered {} ({} handlers)",
            registered.name, registered.handler_count
        );
        true
    }

    /// Lock-free snapshot of the invoker list for one event-type key.
    pub(crate) fn snapshot_for(&self, event_type: TypeId) -> Option<Arc<Vec<Arc<BoundInvoker>>>> {
        self.entries
            .get(&event_type)
            .map(|entry| entry.invokers.load_full())
    }

    /// Structural version; bumped on every register/unregister.
    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.registered.len()
    }

    pub(crate) fn invoker_count(&self) -> usize {
        self.registered
            .iter()
            .map(|registered| registered.handler_count)
            .sum()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.entries.len())
            .field("subscribers", &self.registered.len())
            .field("version", &self.version())
            .finish()
    }
}
