use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::domain::UserId;

/// Per-user mutable state with one lock per user.
///
/// The outer map lock is held only to look up or insert a slot, so checks for
/// different users never wait on each other's state.
#[derive(Debug, Default)]
pub(crate) struct UserSlots<T> {
    inner: Mutex<HashMap<UserId, Arc<Mutex<T>>>>,
}

impl<T: Default> UserSlots<T> {
    pub(crate) fn slot(&self, user_id: UserId) -> Arc<Mutex<T>> {
        let mut map = lock(&self.inner);
        map.entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(T::default())))
            .clone()
    }

    /// Drop every slot for which `keep` returns false. Slots currently handed
    /// out by [`UserSlots::slot`] are always kept, so a check in flight never
    /// writes into a slot that is no longer in the map.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&T) -> bool) {
        let mut map = lock(&self.inner);
        map.retain(|_, slot| Arc::strong_count(slot) > 1 || keep(&lock(slot)));
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).len()
    }
}

/// Guard state is a best-effort counter; a panic in another holder must not
/// wedge admission for everyone, so poisoning is ignored.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
