//! Subscriber-side record of joined registries.
//!
//! A subscriber that joins many registries can own a [`Memberships`] value to
//! leave all of them when it is dropped, instead of waiting for each registry
//! to sweep its expired entry. Joining is two separate calls at the call site:
//!
//! ```rust,ignore
//! let token = registry.attach(&handle)?;
//! subscriber.memberships().record(&registry, token);
//! ```
//!
//! Neither side calls back into the other while recording, so there is no
//! mutual recursion to guard against.

use std::fmt;
use std::sync::{Arc, Weak};

use log::debug;
use parking_lot::Mutex;

use crate::handle::{RegistryId, SubscriberToken};
use crate::registry::Registry;

/// A registry that can release an entry by token.
pub trait Unsubscribe: Send + Sync {
    /// Id of the registry.
    fn registry_id(&self) -> RegistryId;

    /// Removes the entry issued `token`. Returns true if it was present.
    fn release(&self, token: SubscriberToken) -> bool;
}

impl<S: ?Sized + Send + Sync> Unsubscribe for Registry<S> {
    fn registry_id(&self) -> RegistryId {
        self.id()
    }

    fn release(&self, token: SubscriberToken) -> bool {
        self.detach_token(token)
    }
}

struct Membership {
    registry_id: RegistryId,
    registry: Weak<dyn Unsubscribe>,
    token: SubscriberToken,
}

impl Membership {
    fn release(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.release(self.token))
    }
}

/// The registries a subscriber has joined, with the token each one issued.
///
/// Dropping this value leaves every registry that is still alive.
#[derive(Default)]
pub struct Memberships {
    joined: Mutex<Vec<Membership>>,
}

impl Memberships {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers that `registry` issued `token` for the owning subscriber.
    ///
    /// A previous record for the same registry is replaced.
    pub fn record<R>(&self, registry: &Arc<R>, token: SubscriberToken)
    where
        R: Unsubscribe + 'static,
    {
        let registry_id = registry.registry_id();
        let weak = Arc::downgrade(registry);
        let weak: Weak<dyn Unsubscribe> = weak;
        let membership = Membership {
            registry_id,
            registry: weak,
            token,
        };

        let mut joined = self.joined.lock();
        match joined.iter_mut().find(|m| m.registry_id == registry_id) {
            Some(existing) => *existing = membership,
            None => joined.push(membership),
        }
    }

    /// Drops the record for `registry_id` without detaching.
    pub fn forget(&self, registry_id: RegistryId) -> bool {
        self.take(registry_id).is_some()
    }

    /// Detaches from `registry_id` and drops the record.
    ///
    /// Returns true if the registry still held the entry.
    pub fn leave(&self, registry_id: RegistryId) -> bool {
        self.take(registry_id).is_some_and(|m| m.release())
    }

    /// Detaches from every recorded registry that is still alive.
    ///
    /// Returns how many entries were removed.
    pub fn leave_all(&self) -> usize {
        let joined = std::mem::take(&mut *self.joined.lock());
        let released = joined.iter().filter(|m| m.release()).count();
        if released > 0 {
            debug!("left {released} of {} joined registries", joined.len());
        }
        released
    }

    /// Drops records whose registry no longer exists.
    pub fn prune_dead_registries(&self) -> usize {
        let mut joined = self.joined.lock();
        let before = joined.len();
        joined.retain(|m| m.registry.strong_count() > 0);
        before - joined.len()
    }

    /// Ids of the recorded registries, in join order.
    #[must_use]
    pub fn joined(&self) -> Vec<RegistryId> {
        self.joined.lock().iter().map(|m| m.registry_id).collect()
    }

    /// Token recorded for `registry_id`.
    #[must_use]
    pub fn token_for(&self, registry_id: RegistryId) -> Option<SubscriberToken> {
        self.joined
            .lock()
            .iter()
            .find(|m| m.registry_id == registry_id)
            .map(|m| m.token)
    }

    /// Number of recorded registries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.joined.lock().len()
    }

    /// True if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joined.lock().is_empty()
    }

    fn take(&self, registry_id: RegistryId) -> Option<Membership> {
        let mut joined = self.joined.lock();
        let index = joined.iter().position(|m| m.registry_id == registry_id)?;
        Some(joined.remove(index))
    }
}

impl Drop for Memberships {
    fn drop(&mut self) {
        self.leave_all();
    }
}

impl fmt::Debug for Memberships {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memberships").field("joined", &self.joined()).finish()
    }
}
