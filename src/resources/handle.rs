// Copyright 2024 Saptak Santra
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

//! Exclusive owner / self-invalidating observer pointer pair.
//!
//! The owner holds the only copy of the value. Observers share a link with
//! the owner and read the value through it; when the owner is reset or
//! dropped the link is emptied under its write lock, so every observer sees
//! `None` on its next access. An observer can never reach a destroyed value.

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ResourceError, Result};
use crate::resources::notify::{ListenerId, ListenerSet};

/// Read access to an observed value; blocks destruction while held
pub type ObserverRef<'a, T> = MappedRwLockReadGuard<'a, T>;

struct Link<T> {
    value: RwLock<Option<T>>,
    destroyed: AtomicBool,
    on_destroyed: ListenerSet<()>,
}

/// Exclusive owner of a value. Not cloneable.
pub struct OwnerPtr<T> {
    link: Arc<Link<T>>,
}

impl<T> OwnerPtr<T> {
    pub fn new(value: T) -> Self {
        Self {
            link: Arc::new(Link {
                value: RwLock::new(Some(value)),
                destroyed: AtomicBool::new(false),
                on_destroyed: ListenerSet::new(),
            }),
        }
    }

    /// Creates an observer subscribed to this owner
    pub fn observe(&self) -> ObserverPtr<T> {
        ObserverPtr {
            link: Some(self.link.clone()),
        }
    }

    pub fn get(&self) -> Option<ObserverRef<'_, T>> {
        read_link(&self.link)
    }

    pub fn is_destroyed(&self) -> bool {
        self.link.destroyed.load(Ordering::Acquire)
    }

    /// Subscribes to the destroyed broadcast
    pub fn on_destroyed(&self, callback: impl Fn(&()) + Send + Sync + 'static) -> ListenerId {
        self.link.on_destroyed.subscribe(callback)
    }

    /// Number of live observers
    pub fn observer_count(&self) -> usize {
        Arc::strong_count(&self.link) - 1
    }

    /// Destroys the value. Observers are invalidated before the broadcast
    /// fires, and the broadcast fires before the value is dropped. Calling
    /// this twice is a no-op.
    pub fn reset(&mut self) {
        if self.link.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let value = self.link.value.write().take();
        self.link.on_destroyed.notify(&());
        self.link.on_destroyed.clear();
        drop(value);
    }
}

impl<T> Drop for OwnerPtr<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> fmt::Debug for OwnerPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerPtr")
            .field("destroyed", &self.is_destroyed())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Non-owning handle, nulled the instant its owner is destroyed
pub struct ObserverPtr<T> {
    link: Option<Arc<Link<T>>>,
}

impl<T> ObserverPtr<T> {
    /// Observer that never pointed at anything
    pub fn null() -> Self {
        Self { link: None }
    }

    pub fn get(&self) -> Option<ObserverRef<'_, T>> {
        self.link.as_ref().and_then(|link| read_link(link))
    }

    /// Like [`get`](Self::get), but reports an invalidated observer as an error
    pub fn try_get(&self) -> Result<ObserverRef<'_, T>> {
        self.get().ok_or(ResourceError::ObserverInvalidated)
    }

    pub fn is_valid(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| !link.destroyed.load(Ordering::Acquire))
    }

    /// Drops the subscription early
    pub fn reset(&mut self) {
        self.link = None;
    }

    /// True when both observe the same owner
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.link, &other.link) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T> Clone for ObserverPtr<T> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
        }
    }
}

impl<T> Default for ObserverPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for ObserverPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverPtr")
            .field("valid", &self.is_valid())
            .finish()
    }
}

// Recursive reads: a thread already holding a guard (e.g. a loader running
// on a resource) may read it again while a destroyer waits for the lock.
fn read_link<T>(link: &Link<T>) -> Option<ObserverRef<'_, T>> {
    RwLockReadGuard::try_map(link.value.read_recursive(), |value| value.as_ref()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_observer_reads_owner_value() {
        let owner = OwnerPtr::new(42u32);
        let observer = owner.observe();

        assert!(observer.is_valid());
        assert_eq!(*observer.get().unwrap(), 42);
        assert_eq!(owner.observer_count(), 1);
    }

    #[test]
    fn test_drop_invalidates_every_observer() {
        let owner = OwnerPtr::new(String::from("texture"));
        let first = owner.observe();
        let second = first.clone();

        drop(owner);

        assert!(!first.is_valid());
        assert!(first.get().is_none());
        assert!(second.get().is_none());
        assert!(matches!(
            second.try_get(),
            Err(ResourceError::ObserverInvalidated)
        ));
    }

    #[test]
    fn test_broadcast_fires_exactly_once() {
        let mut owner = OwnerPtr::new(1u8);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        owner.on_destroyed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        owner.reset();
        owner.reset();
        drop(owner);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_is_null_during_broadcast() {
        let mut owner = OwnerPtr::new(7i32);
        let observer = owner.observe();
        let seen_valid = Arc::new(AtomicBool::new(true));
        let flag = seen_valid.clone();
        let inside = observer.clone();
        owner.on_destroyed(move |_| {
            flag.store(inside.get().is_some(), Ordering::SeqCst);
        });

        owner.reset();
        assert!(!seen_valid.load(Ordering::SeqCst));
        assert!(!observer.is_valid());
    }

    #[test]
    fn test_ptr_eq() {
        let owner = OwnerPtr::new(0u8);
        let other = OwnerPtr::new(0u8);
        assert!(owner.observe().ptr_eq(&owner.observe()));
        assert!(!owner.observe().ptr_eq(&other.observe()));
        assert!(!ObserverPtr::<u8>::null().ptr_eq(&ObserverPtr::null()));
    }
}
