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

//! Notification points with one slot per listener.

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};
use std::sync::Arc;

new_key_type! {
    /// Slot of a subscribed listener
    pub struct ListenerId;
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Broadcast point. Listeners are called outside the internal lock, so a
/// callback may subscribe or unsubscribe without deadlocking.
pub struct ListenerSet<E> {
    listeners: Mutex<SlotMap<ListenerId, Callback<E>>>,
}

impl<E> ListenerSet<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(SlotMap::with_key()),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        self.listeners.lock().insert(Arc::new(callback))
    }

    /// Returns false if the slot was already empty
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(id).is_some()
    }

    pub fn notify(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self.listeners.lock().values().cloned().collect();
        for callback in snapshot {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl<E> Default for ListenerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_reaches_every_listener() {
        let set = ListenerSet::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = total.clone();
            set.subscribe(move |value| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }

        set.notify(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe_frees_slot() {
        let set = ListenerSet::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = set.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(set.unsubscribe(id));
        assert!(!set.unsubscribe(id));
        set.notify(&());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(set.is_empty());
    }
}
