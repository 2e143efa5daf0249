use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Registry of pending results keyed by `K`. The first caller to claim a key
/// becomes its owner; everybody else attaches to the owner's result.
pub(crate) struct InFlight<K, V> {
    pending: Arc<Mutex<HashMap<K, watch::Receiver<Option<V>>>>>,
}

pub(crate) enum Claim<K: Eq + Hash, V> {
    Owner(InFlightGuard<K, V>),
    Waiter(InFlightWaiter<V>),
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn claim(&self, key: K) -> Claim<K, V> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(receiver) = pending.get(&key) {
            return Claim::Waiter(InFlightWaiter {
                receiver: receiver.clone(),
            });
        }

        let (sender, receiver) = watch::channel(None);
        pending.insert(key.clone(), receiver);

        Claim::Owner(InFlightGuard {
            key,
            sender,
            pending: Arc::clone(&self.pending),
            resolved: false,
        })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub(crate) struct InFlightGuard<K: Eq + Hash, V> {
    key: K,
    sender: watch::Sender<Option<V>>,
    pending: Arc<Mutex<HashMap<K, watch::Receiver<Option<V>>>>>,
    resolved: bool,
}

impl<K: Eq + Hash, V> InFlightGuard<K, V> {
    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    /// Deregisters the key and hands `value` to every attached waiter.
    pub(crate) fn resolve(mut self, value: V) {
        self.deregister();
        self.resolved = true;
        // Nobody may be listening any more.
        let _ = self.sender.send(Some(value));
    }

    fn deregister(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<K: Eq + Hash, V> Drop for InFlightGuard<K, V> {
    fn drop(&mut self) {
        if !self.resolved {
            self.deregister();
        }
    }
}

pub(crate) struct InFlightWaiter<V> {
    receiver: watch::Receiver<Option<V>>,
}

impl<V: Clone> InFlightWaiter<V> {
    /// Resolves to `None` when the owner went away without a result.
    pub(crate) async fn wait(mut self) -> Option<V> {
        loop {
            if let Some(value) = self.receiver.borrow().clone() {
                return Some(value);
            }

            if self.receiver.changed().await.is_err() {
                return self.receiver.borrow().clone();
            }
        }
    }
}
